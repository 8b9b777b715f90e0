use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported state schema version {0}")]
    UnsupportedSchema(u32),

    #[error("Write rejected by backing store")]
    WriteRejected,

    #[error("Crypto error: {0}")]
    Crypto(#[from] guardiant_crypto::CryptoError),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
