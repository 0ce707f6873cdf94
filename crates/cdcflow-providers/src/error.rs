use thiserror::Error;

/// Errors raised while loading and validating the configuration file, or
/// while resolving a `SourceType`/`ProgressType`/plugin name to its
/// concrete implementation.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("could not read config file '{path}': {source}")]
    Io { path: String, source: std::io::Error },

    #[error("config file is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Domain(#[from] cdcflow_domain::DomainError),

    #[error("progress store error: {0}")]
    Persistence(#[from] cdcflow_persistence::PersistenceError),

    #[error(transparent)]
    Source(#[from] cdcflow_core::SourceError),

    #[error("source '{0}' missing required field '{1}'")]
    MissingSourceField(&'static str, &'static str),

    #[error("no registered plugin named '{0}'")]
    UnknownPlugin(String),
}
