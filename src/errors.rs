use thiserror::Error;

/// Aggregates every collaborator crate's error into the one enum the CLI
/// commands propagate up to `main`, which prints it and exits nonzero
/// (spec.md §6 "Exit codes").
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] cdcflow_providers::ProviderError),

    #[error(transparent)]
    Infra(#[from] cdcflow_infra::InfraError),

    #[error(transparent)]
    Sink(#[from] cdcflow_adapters::SinkError),

    #[error(transparent)]
    Source(#[from] cdcflow_core::SourceError),

    #[error(transparent)]
    Persistence(#[from] cdcflow_persistence::PersistenceError),

    #[error("table '{0}' is not declared under `sync` in the configuration file")]
    UnknownTable(String),
}
