use thiserror::Error;

/// Errors raised by the MeiliSearch sink writer. Only the "index not
/// found" MeiliSearch error code gets a semantic translation
/// (`index_exists` → `false`); every other wire error propagates as-is
/// (spec.md §7).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Meili(#[from] meilisearch_sdk::errors::Error),

    #[error("waiting for MeiliSearch task timed out")]
    TaskTimeout,

    #[error("plugin chain failed: {0}")]
    Plugin(#[from] cdcflow_core::CoreError),

    #[error("no sync declared for table '{0}'")]
    UnknownSync(String),

    #[error("source stream error: {0}")]
    Source(#[from] cdcflow_core::SourceError),
}

impl SinkError {
    /// `true` when the underlying MeiliSearch error is specifically
    /// "index not found" — the one wire error this sink translates rather
    /// than propagates (spec.md §4.4 `index_exists`, §4.4.1 step 3).
    pub fn is_index_not_found(&self) -> bool {
        match self {
            SinkError::Meili(meilisearch_sdk::errors::Error::Meilisearch(e)) => {
                e.error_code == meilisearch_sdk::errors::ErrorCode::IndexNotFound
            }
            _ => false,
        }
    }
}
