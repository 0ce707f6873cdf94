use thiserror::Error;

/// Aggregates every collaborator's error into the one enum the engine and
/// its CLI commands propagate. Mirrors the per-crate `#[from]` chaining
/// this corpus uses everywhere errors cross a module boundary.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error(transparent)]
    Source(#[from] cdcflow_core::SourceError),

    #[error(transparent)]
    Core(#[from] cdcflow_core::CoreError),

    #[error(transparent)]
    Sink(#[from] cdcflow_adapters::SinkError),

    #[error(transparent)]
    Persistence(#[from] cdcflow_persistence::PersistenceError),

    #[error(transparent)]
    Provider(#[from] cdcflow_providers::ProviderError),

    #[error(transparent)]
    Domain(#[from] cdcflow_domain::DomainError),

    #[error("no sync declared for table '{0}'")]
    UnknownSync(String),
}
