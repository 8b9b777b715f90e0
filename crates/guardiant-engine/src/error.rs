use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Device is not provisioned")]
    NotProvisioned,

    #[error("Device is already provisioned")]
    AlreadyProvisioned,

    #[error("Provisioning failed: {0}")]
    Provisioning(String),

    #[error("Coordinator is not running")]
    ChannelClosed,

    #[error("Task failed: {0}")]
    Task(String),

    #[error("Storage error: {0}")]
    Store(#[from] guardiant_store::StoreError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] guardiant_crypto::CryptoError),

    #[error("Backend error: {0}")]
    Backend(#[from] guardiant_alerts::BackendError),
}

pub type EngineResult<T> = Result<T, EngineError>;
