use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlockError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("no server available")]
    NoAvailableBackend,

    #[error("network error: {0}")]
    Network(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, FlockError>;

// Error conversions for common error types

impl From<serde_json::Error> for FlockError {
    fn from(e: serde_json::Error) -> Self {
        FlockError::Serialization(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for FlockError {
    fn from(e: bincode::error::EncodeError) -> Self {
        FlockError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for FlockError {
    fn from(e: bincode::error::DecodeError) -> Self {
        FlockError::Serialization(e.to_string())
    }
}
