//! Configuration loading and the static source/progress/plugin registries
//! that bind a parsed `Config` to concrete `cdcflow-adapters`/
//! `cdcflow-persistence` implementations.

pub mod config;
pub mod error;
pub mod plugins;
pub mod registry;

pub use config::{Config, MeiliSearchConfig, ProgressConfig, SentryConfig, SourceConfig};
pub use error::ProviderError;
pub use registry::{build_progress, build_source};
