use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Backend rejected request: {0}")]
    Rejected(String),

    #[error("Malformed backend response: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BackendError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Transport(_) => true,
            BackendError::Status { status, .. } => *status >= 500 || *status == 429,
            BackendError::Rejected(_) | BackendError::Protocol(_) | BackendError::Config(_) => false,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Protocol(e.to_string())
        } else {
            BackendError::Transport(e.to_string())
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;
