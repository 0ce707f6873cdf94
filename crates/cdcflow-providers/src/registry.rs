//! Static, `match`-dispatched registries for `SourceType -> SourceCursor`
//! and `ProgressType -> ProgressStore`. Rust has no `pkgutil`/`importlib`
//! equivalent worth building for a single binary; a `match` over the enum
//! *is* the idiomatic static registry (SPEC_FULL.md §4.6, Open Question
//! decision in DESIGN.md).

use cdcflow_adapters::mongo::MongoCursor;
use cdcflow_adapters::mysql::MySqlCursor;
use cdcflow_adapters::postgres::PostgresCursor;
use cdcflow_core::SourceCursor;
use cdcflow_domain::Checkpoint;
use cdcflow_persistence::{FileProgressStore, ProgressStore, RedisProgressStore};

use crate::config::{ProgressConfig, SourceConfig};
use crate::error::ProviderError;

/// Builds the declared source's cursor, restoring `checkpoint` if one was
/// persisted. `tables` is the full set of declared table names the cursor
/// must filter its native stream to (spec.md §4.1: "events for tables not
/// in the declared set are silently dropped by the cursor").
pub async fn build_source(
    cfg: &SourceConfig,
    tables: Vec<String>,
    checkpoint: Option<Checkpoint>,
) -> Result<Box<dyn SourceCursor>, ProviderError> {
    match cfg.kind {
        cdcflow_domain::SourceType::MySql => {
            let opts = cdcflow_adapters::mysql::MySqlOptions {
                host: cfg.host.clone().unwrap_or_else(|| "127.0.0.1".to_string()),
                port: cfg.port.unwrap_or(3306),
                user: cfg.user.clone(),
                password: cfg.password.clone(),
                database: cfg.database.clone(),
                server_id: cfg.server_id,
            };
            let cursor = MySqlCursor::connect(opts, tables, checkpoint).await?;
            Ok(Box::new(cursor))
        }
        cdcflow_domain::SourceType::Postgres => {
            let opts = cdcflow_adapters::postgres::PostgresOptions {
                host: cfg.host.clone().unwrap_or_else(|| "127.0.0.1".to_string()),
                port: cfg.port.unwrap_or(5432),
                user: cfg.user.clone().unwrap_or_else(|| "postgres".to_string()),
                password: cfg.password.clone(),
                database: cfg.database.clone(),
                slot_name: cfg
                    .extra
                    .get("slot_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("meilisync")
                    .to_string(),
            };
            let cursor = PostgresCursor::connect(opts, tables, checkpoint).await?;
            Ok(Box::new(cursor))
        }
        cdcflow_domain::SourceType::Mongo => {
            let opts = cdcflow_adapters::mongo::MongoOptions {
                host: cfg.host.clone().unwrap_or_else(|| "127.0.0.1".to_string()),
                port: cfg.port.unwrap_or(27017),
                user: cfg.user.clone(),
                password: cfg.password.clone(),
                database: cfg.database.clone(),
            };
            let cursor = MongoCursor::connect(opts, tables, checkpoint).await?;
            Ok(Box::new(cursor))
        }
    }
}

/// Builds the declared progress store backend.
pub fn build_progress(cfg: &ProgressConfig) -> Result<Box<dyn ProgressStore>, ProviderError> {
    match cfg.kind {
        cdcflow_domain::ProgressType::File => {
            let path = cfg.path.clone().unwrap_or_else(|| FileProgressStore::default_path().to_string_lossy().into_owned());
            Ok(Box::new(FileProgressStore::new(path)))
        }
        cdcflow_domain::ProgressType::Redis => {
            let dsn = cfg.dsn.clone().unwrap_or_else(|| RedisProgressStore::default_dsn().to_string());
            let key = cfg.key.clone().unwrap_or_else(|| RedisProgressStore::default_key().to_string());
            Ok(Box::new(RedisProgressStore::new(&dsn, key)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_defaults_apply_when_unset() {
        let cfg = ProgressConfig {
            kind: cdcflow_domain::ProgressType::File,
            path: None,
            dsn: None,
            key: None,
            extra: Default::default(),
        };
        let store = build_progress(&cfg).unwrap();
        let _: Box<dyn ProgressStore> = store;
    }
}
