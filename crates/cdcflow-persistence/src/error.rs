use thiserror::Error;

/// Errors from either progress-store backend. Mapped from the underlying
/// driver error (`std::io::Error` for the file backend, `redis::RedisError`
/// for the redis backend) into semantic variants.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("progress file io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("progress file contained invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("stored checkpoint could not be decoded: {0}")]
    InvalidCheckpoint(#[from] cdcflow_domain::DomainError),

    #[error("redis connection error: {0}")]
    RedisConnection(String),

    #[error("redis command error: {0}")]
    RedisCommand(String),
}
