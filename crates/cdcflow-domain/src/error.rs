use thiserror::Error;

/// Errors produced while constructing or converting domain types. Driver-
/// level failures live in `cdcflow-core`/`cdcflow-adapters`; this enum only
/// covers the domain model itself (checkpoint (de)serialization, sync
/// validation).
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("checkpoint field '{0}' missing from stored progress")]
    MissingCheckpointField(&'static str),

    #[error("checkpoint kind mismatch: expected {expected}, stored progress has {found}")]
    CheckpointKindMismatch { expected: &'static str, found: String },

    #[error("invalid checkpoint value for '{field}': {reason}")]
    InvalidCheckpointValue { field: &'static str, reason: String },

    #[error("duplicate sync table declared: {0}")]
    DuplicateSyncTable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
