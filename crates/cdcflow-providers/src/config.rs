//! YAML configuration loading: `${VAR}` environment interpolation, strict
//! top-level key validation, and duplicate-`sync.table` rejection.
//!
//! Ported in behavior from `original_source/meilisync/yaml_parser.py`
//! (env interpolation) and `settings.py` (nested settings, `extra=allow`
//! on driver-specific sections).

use std::collections::{HashMap, HashSet};
use std::path::Path;

use cdcflow_domain::{DomainError, ProgressType, SourceType, Sync};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::error::ProviderError;

/// Matches `${VAR_NAME}` anywhere in the document text, same pattern the
/// original `yaml_parser.py` resolves via a custom YAML loader constructor.
static ENV_VAR_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub plugins: Vec<String>,
    pub progress: ProgressConfig,
    pub source: SourceConfig,
    pub meilisearch: MeiliSearchConfig,
    pub sync: Vec<Sync>,
    pub sentry: Option<SentryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressConfig {
    #[serde(rename = "type")]
    pub kind: ProgressType,
    pub path: Option<String>,
    pub dsn: Option<String>,
    pub key: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(rename = "type")]
    pub kind: SourceType,
    pub database: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_server_id")]
    pub server_id: u32,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_server_id() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeiliSearchConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub insert_size: Option<usize>,
    pub insert_interval: Option<u64>,
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
}

fn default_task_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentryConfig {
    pub dsn: String,
    #[serde(default = "default_sentry_environment")]
    pub environment: String,
}

fn default_sentry_environment() -> String {
    "production".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ProviderError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let interpolated = interpolate_env(&raw);
        let config: Config = serde_yaml::from_str(&interpolated)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), DomainError> {
        let mut seen = HashSet::new();
        for sync in &self.sync {
            if !seen.insert(sync.table.clone()) {
                return Err(DomainError::DuplicateSyncTable(sync.table.clone()));
            }
        }
        Ok(())
    }

    pub fn table_names(&self) -> Vec<String> {
        self.sync.iter().map(|s| s.table.clone()).collect()
    }
}

/// Replaces every `${VAR}` occurrence with the value of the matching
/// environment variable, leaving the placeholder untouched if the variable
/// is unset (same "best effort" behavior as `os.path.expandvars`, which the
/// original `yaml_parser.py` delegates to).
fn interpolate_env(text: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(text, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_known_env_vars() {
        std::env::set_var("CDCFLOW_TEST_VAR", "secret123");
        let out = interpolate_env("password: ${CDCFLOW_TEST_VAR}");
        assert_eq!(out, "password: secret123");
        std::env::remove_var("CDCFLOW_TEST_VAR");
    }

    #[test]
    fn leaves_unset_var_placeholder_untouched() {
        std::env::remove_var("CDCFLOW_DEFINITELY_UNSET");
        let out = interpolate_env("x: ${CDCFLOW_DEFINITELY_UNSET}");
        assert_eq!(out, "x: ${CDCFLOW_DEFINITELY_UNSET}");
    }

    #[test]
    fn rejects_unknown_top_level_keys() {
        let yaml = r#"
debug: true
progress:
  type: file
source:
  type: mysql
  database: test
meilisearch:
  api_url: http://localhost:7700
sync: []
unexpected_key: 1
"#;
        let err = serde_yaml::from_str::<Config>(yaml).unwrap_err();
        assert!(err.to_string().contains("unexpected_key") || err.to_string().contains("unknown field"));
    }

    #[test]
    fn rejects_duplicate_sync_tables() {
        let yaml = r#"
progress:
  type: file
source:
  type: mysql
  database: test
meilisearch:
  api_url: http://localhost:7700
sync:
  - table: orders
  - table: orders
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, DomainError::DuplicateSyncTable(t) if t == "orders"));
    }

    #[test]
    fn accepts_extra_driver_specific_fields() {
        let yaml = r#"
progress:
  type: redis
  dsn: redis://localhost/0
  key: my:key
source:
  type: postgres
  database: test
  host: localhost
  port: 5432
  some_driver_flag: true
meilisearch:
  api_url: http://localhost:7700
sync: []
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.source.extra.get("some_driver_flag"), Some(&serde_json::json!(true)));
    }
}
