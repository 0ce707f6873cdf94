//! Implementations of the four CLI subcommands. Each takes an already
//! loaded `Config` and wires the collaborator crates together exactly as
//! `original_source/meilisync/main.py`'s `cli()` does, generalized to the
//! engine/sink/progress-store abstractions this workspace builds.

use std::collections::HashMap;
use std::sync::Arc;

use cdcflow_adapters::{SinkWriter, SyncTarget};
use cdcflow_core::plugin::PluginChain;
use cdcflow_domain::Sync;
use cdcflow_infra::Engine;
use cdcflow_providers::{build_progress, build_source, plugins, Config};
use futures::StreamExt;

use crate::errors::CliError;

/// Builds the engine-global plugin chain and one per-sync chain, each
/// resolved from its sync's own `plugins` list — spec.md §4.4's "global
/// plugins first, then per-sync" ordering is assembled later by
/// `cdcflow_infra::resolve_targets`.
fn build_plugin_chains(config: &Config) -> Result<(PluginChain, HashMap<String, PluginChain>), CliError> {
    let global = plugins::build_chain(&config.plugins)?;
    let mut per_sync = HashMap::new();
    for sync in &config.sync {
        per_sync.insert(sync.table.clone(), plugins::build_chain(&sync.plugins)?);
    }
    Ok((global, per_sync))
}

/// Resolves the `-t/--table` filter against the declared syncs. An empty
/// filter means "every declared sync"; a named table that isn't declared
/// is an error rather than a silent no-op.
fn select_syncs(config: &Config, tables: &[String]) -> Result<Vec<Sync>, CliError> {
    if tables.is_empty() {
        return Ok(config.sync.clone());
    }
    tables
        .iter()
        .map(|t| {
            config
                .sync
                .iter()
                .find(|s| &s.table == t)
                .cloned()
                .ok_or_else(|| CliError::UnknownTable(t.clone()))
        })
        .collect()
}

fn build_sink(config: &Config, targets: Vec<SyncTarget>) -> Result<SinkWriter, CliError> {
    let sink = SinkWriter::new(
        &config.meilisearch.api_url,
        config.meilisearch.api_key.as_deref(),
        targets,
        config.meilisearch.task_timeout_secs,
    )?;
    Ok(sink)
}

/// `start`: runs the replication engine until killed (spec.md §6).
///
/// Restores the persisted checkpoint, builds the source cursor at that
/// position, bootstraps any `full=true` sync whose index doesn't exist yet,
/// then hands off to `cdcflow_infra::Engine` for the reader/flush-timer
/// loop described in spec.md §4.5.
pub async fn start(config: Config) -> Result<(), CliError> {
    let progress_store = build_progress(&config.progress)?;
    let restored = progress_store.get(config.source.kind).await?;

    let tables = config.table_names();
    let source = build_source(&config.source, tables, restored.clone()).await?;

    let (global, per_sync) = build_plugin_chains(&config)?;
    let targets = cdcflow_infra::resolve_targets(&config.sync, &global, &per_sync);
    let sink = Arc::new(build_sink(&config, targets)?);

    let engine = Engine::new(
        source,
        sink,
        Arc::from(progress_store),
        config.sync.clone(),
        config.meilisearch.insert_size,
        config.meilisearch.insert_interval,
        restored,
    );
    engine.run().await?;
    Ok(())
}

/// `refresh`: full refresh via atomic index swap (or in-place with
/// `--keep-index`), spec.md §4.4.1/§6. Persists the pre-refresh current
/// progress *before* copying so that a subsequent `start` resumes
/// incrementally from the correct anchor rather than replaying the rows
/// this command just copied.
pub async fn refresh(config: Config, tables: Vec<String>, size: usize, keep_index: bool) -> Result<(), CliError> {
    let selected = select_syncs(&config, &tables)?;

    let progress_store = build_progress(&config.progress)?;
    let source = build_source(&config.source, config.table_names(), None).await?;

    let anchor = source.get_current_progress().await?;
    progress_store.set(&anchor).await?;

    let (global, per_sync) = build_plugin_chains(&config)?;
    let targets = cdcflow_infra::resolve_targets(&selected, &global, &per_sync);
    let sink = build_sink(&config, targets)?;

    for sync in &selected {
        let target = sink.sync_target(&sync.table).ok_or_else(|| CliError::UnknownTable(sync.table.clone()))?;
        tracing::info!(table = %sync.table, index = sync.index_name(), "starting full refresh");
        let full_data = source.get_full_data(sync, size).await?;
        sink.refresh_data(target, full_data, keep_index).await?;
        tracing::info!(table = %sync.table, index = sync.index_name(), "full refresh complete");
    }
    Ok(())
}

/// `check`: compares `source.get_count` against `meili.get_count(index)`
/// per selected sync, logging OK or MISMATCH with both counts (spec.md §6).
pub async fn check(config: Config, tables: Vec<String>) -> Result<(), CliError> {
    let selected = select_syncs(&config, &tables)?;
    let source = build_source(&config.source, config.table_names(), None).await?;
    let sink = build_sink(&config, Vec::new())?;

    for sync in &selected {
        let source_count = source.get_count(sync).await?;
        let sink_count = sink.get_count(sync.index_name()).await?;
        if source_count == sink_count {
            tracing::info!(table = %sync.table, index = sync.index_name(), count = source_count, "OK");
        } else {
            tracing::warn!(
                table = %sync.table,
                index = sync.index_name(),
                source_count,
                sink_count,
                "MISMATCH"
            );
        }
    }
    Ok(())
}

/// `version`: prints the build version.
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdcflow_providers::{MeiliSearchConfig, ProgressConfig, SourceConfig};

    fn sample_config(syncs: Vec<Sync>) -> Config {
        Config {
            debug: false,
            plugins: vec![],
            progress: ProgressConfig { kind: cdcflow_domain::ProgressType::File, path: None, dsn: None, key: None, extra: Default::default() },
            source: SourceConfig {
                kind: cdcflow_domain::SourceType::MySql,
                database: "test".into(),
                host: None,
                port: None,
                user: None,
                password: None,
                server_id: 1,
                extra: Default::default(),
            },
            meilisearch: MeiliSearchConfig { api_url: "http://localhost:7700".into(), api_key: None, insert_size: None, insert_interval: None, task_timeout_secs: 30 },
            sync: syncs,
            sentry: None,
        }
    }

    fn sample_sync(table: &str) -> Sync {
        Sync { table: table.to_string(), pk: "id".into(), full: false, index: None, fields: None, plugins: vec![] }
    }

    #[test]
    fn select_syncs_defaults_to_all_when_filter_empty() {
        let config = sample_config(vec![sample_sync("orders"), sample_sync("users")]);
        let selected = select_syncs(&config, &[]).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn select_syncs_filters_by_named_table() {
        let config = sample_config(vec![sample_sync("orders"), sample_sync("users")]);
        let selected = select_syncs(&config, &["users".to_string()]).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].table, "users");
    }

    #[test]
    fn select_syncs_rejects_undeclared_table() {
        let config = sample_config(vec![sample_sync("orders")]);
        let err = select_syncs(&config, &["missing".to_string()]).unwrap_err();
        assert!(matches!(err, CliError::UnknownTable(t) if t == "missing"));
    }

    #[test]
    fn build_plugin_chains_has_one_entry_per_sync() {
        let config = sample_config(vec![sample_sync("orders"), sample_sync("users")]);
        let (global, per_sync) = build_plugin_chains(&config).unwrap();
        assert!(global.is_empty());
        assert_eq!(per_sync.len(), 2);
    }

    #[test]
    fn version_reports_cargo_package_version() {
        assert_eq!(version(), env!("CARGO_PKG_VERSION"));
    }
}
