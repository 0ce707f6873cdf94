use thiserror::Error;

/// Errors raised by a `SourceCursor`. Only the MySQL cursor retries
/// `Transport` errors internally (spec-mandated 10s backoff); every other
/// variant, from any source, is fatal to the replication engine.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transient transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("table '{0}' not declared for this run")]
    UndeclaredTable(String),

    #[error("{0}")]
    Other(String),
}

impl SourceError {
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        SourceError::Transport(msg.to_string())
    }

    pub fn protocol(msg: impl std::fmt::Display) -> Self {
        SourceError::Protocol(msg.to_string())
    }

    pub fn connection(msg: impl std::fmt::Display) -> Self {
        SourceError::Connection(msg.to_string())
    }
}

/// Top-level error surfaced by the core collaborators (the collection and
/// plugin chain). Sink and progress-store errors live in their own crates
/// and are folded into this one only at the engine boundary
/// (`cdcflow-infra`).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("plugin '{name}' failed: {reason}")]
    Plugin { name: String, reason: String },

    #[error("internal: {0}")]
    Internal(String),
}
