use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AEAD encryption failed")]
    EncryptionFailed,

    #[error("AEAD decryption failed: ciphertext tampered or wrong key")]
    DecryptionFailed,

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Sealed blob too short: {0} bytes")]
    Truncated(usize),

    #[error("Invalid PIN: {0}")]
    InvalidPin(String),

    #[error("Remote command authentication failed")]
    CommandRejected,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Base64 decode error: {0}")]
    Base64(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
