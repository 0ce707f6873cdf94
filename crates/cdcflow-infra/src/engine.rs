//! The replication engine: a reader task consuming a source cursor's event
//! stream plus an optional flush task, cooperating over one mutex guarding
//! `(collection, last_checkpoint)` — spec.md §4.5/§5. The reader/flush
//! split runs a single-writer state machine across two `tokio::spawn`ed
//! tasks rather than one synchronous stepper.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cdcflow_adapters::{SinkWriter, SyncTarget};
use cdcflow_core::collection::EventCollection;
use cdcflow_core::plugin::PluginChain;
use cdcflow_core::source::SourceCursor;
use cdcflow_domain::{Checkpoint, SourceMessage, Sync};
use cdcflow_persistence::ProgressStore;
use futures::StreamExt;
use tokio::sync::Mutex;

use crate::error::InfraError;

struct EngineState {
    collection: EventCollection,
    last_checkpoint: Option<Checkpoint>,
}

/// Builds the per-sync plugin chains a sink's `SyncTarget`s need: engine-
/// global plugins first, then each sync's own, in declaration order
/// (spec.md §4.4's fixed ordering).
pub fn resolve_targets(syncs: &[Sync], global: &PluginChain, per_sync_chains: &HashMap<String, PluginChain>) -> Vec<SyncTarget> {
    let empty = PluginChain::empty();
    syncs
        .iter()
        .map(|sync| {
            let per_sync = per_sync_chains.get(&sync.table).unwrap_or(&empty);
            let plugins = PluginChain::merge(global, per_sync);
            SyncTarget { sync: sync.clone(), plugins }
        })
        .collect()
}

pub struct Engine {
    source: Box<dyn SourceCursor>,
    sink: Arc<SinkWriter>,
    progress: Arc<dyn ProgressStore>,
    syncs: Vec<Sync>,
    insert_size: Option<usize>,
    insert_interval: Option<u64>,
    batch_size: usize,
    state: Arc<Mutex<EngineState>>,
}

impl Engine {
    pub fn new(
        source: Box<dyn SourceCursor>,
        sink: Arc<SinkWriter>,
        progress: Arc<dyn ProgressStore>,
        syncs: Vec<Sync>,
        insert_size: Option<usize>,
        insert_interval: Option<u64>,
        restored: Option<Checkpoint>,
    ) -> Self {
        Self {
            source,
            sink,
            progress,
            syncs,
            insert_size,
            insert_interval,
            batch_size: 10_000,
            state: Arc::new(Mutex::new(EngineState { collection: EventCollection::new(), last_checkpoint: restored })),
        }
    }

    fn batching_enabled(&self) -> bool {
        self.insert_size.is_some() || self.insert_interval.is_some()
    }

    /// Bootstrap-on-first-run-by-index-existence (spec.md §4.5 step 1):
    /// only `sync.full == true` entries are eligible, and only if their
    /// index does not exist yet — running `start` twice against an
    /// already-bootstrapped index performs no duplicate full copy
    /// (testable property 7).
    async fn bootstrap(&self) -> Result<(), InfraError> {
        for sync in &self.syncs {
            if !sync.full {
                continue;
            }
            let index = sync.index_name();
            if self.sink.index_exists(index).await? {
                tracing::info!(table = %sync.table, index, "index already bootstrapped, skipping full load");
                continue;
            }
            tracing::info!(table = %sync.table, index, "bootstrapping full load");
            let mut total = 0usize;
            let progress = self.source.get_current_progress().await?;
            let mut batches = self.source.get_full_data(sync, self.batch_size).await?;
            while let Some(batch) = batches.next().await {
                let batch = batch?;
                if batch.is_empty() {
                    continue;
                }
                total += batch.len();
                self.sink.add_data(&sync.table, batch, progress.clone()).await?;
            }
            tracing::info!(table = %sync.table, total, "bootstrap complete");
        }
        Ok(())
    }

    /// Runs bootstrap, then the reader loop (and, if configured, the flush
    /// task) until the source stream ends or yields a fatal error.
    pub async fn run(self) -> Result<(), InfraError> {
        self.bootstrap().await?;
        tracing::info!("Start increment sync");

        let Engine { source, sink, progress, syncs, insert_size, insert_interval, batch_size: _, state } = self;
        let batching = insert_size.is_some() || insert_interval.is_some();

        let flush_handle = insert_interval.map(|interval| {
            let sink = sink.clone();
            let progress = progress.clone();
            let state = state.clone();
            tokio::spawn(flush_loop(interval, sink, progress, state))
        });

        let result = reader_loop(source, sink, progress, syncs, batching, insert_size, state).await;

        if let Some(handle) = flush_handle {
            handle.abort();
        }
        result
    }
}

/// Consumes the source's event stream and drives the reader-side state
/// machine described in spec.md §4.5. The mutex is only ever held around
/// the `{add_event/handle_events, progress.set}` tuple, never across
/// `stream.next()` — the structural rule spec.md §5 requires.
async fn reader_loop(
    source: Box<dyn SourceCursor>,
    sink: Arc<SinkWriter>,
    progress: Arc<dyn ProgressStore>,
    syncs: Vec<Sync>,
    batching: bool,
    insert_size: Option<usize>,
    state: Arc<Mutex<EngineState>>,
) -> Result<(), InfraError> {
    let mut stream = source.stream();

    while let Some(message) = stream.next().await {
        let message = message?;
        match message {
            SourceMessage::Progress(p) => {
                let mut guard = state.lock().await;
                guard.last_checkpoint = Some(p.progress.clone());
                drop(guard);
                if !batching {
                    progress.set(&p.progress).await?;
                }
            }
            SourceMessage::Event(event) => {
                let Some(sync) = syncs.iter().find(|s| s.table == event.table).cloned() else {
                    continue;
                };
                if !batching {
                    sink.handle_event(event.clone()).await?;
                    let mut guard = state.lock().await;
                    guard.last_checkpoint = Some(event.progress.clone());
                    drop(guard);
                    progress.set(&event.progress).await?;
                } else {
                    let mut guard = state.lock().await;
                    guard.last_checkpoint = Some(event.progress.clone());
                    guard.collection.add_event(&sync, event);
                    let should_flush = insert_size.map(|n| guard.collection.size() >= n).unwrap_or(false);
                    if should_flush {
                        sink.handle_events(&mut guard.collection).await?;
                        if let Some(cp) = guard.last_checkpoint.clone() {
                            progress.set(&cp).await?;
                        }
                    }
                    drop(guard);
                }
            }
        }
    }
    Ok(())
}

/// Sleeps `interval_secs`, then drains and writes whatever is buffered.
/// Errors are logged and swallowed so the reader keeps running — spec.md
/// §7 "Flush-timer exception".
async fn flush_loop(interval_secs: u64, sink: Arc<SinkWriter>, progress: Arc<dyn ProgressStore>, state: Arc<Mutex<EngineState>>) {
    loop {
        tokio::time::sleep(Duration::from_secs(interval_secs)).await;
        let mut guard = state.lock().await;
        if guard.collection.is_empty() {
            continue;
        }
        if let Err(e) = sink.handle_events(&mut guard.collection).await {
            tracing::error!(error = %e, "flush-timer sink write failed, will retry next tick");
            continue;
        }
        if let Some(cp) = guard.last_checkpoint.clone() {
            if let Err(e) = progress.set(&cp).await {
                tracing::error!(error = %e, "flush-timer progress persist failed, will retry next tick");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_targets_orders_global_before_per_sync() {
        let syncs = vec![Sync { table: "orders".into(), pk: "id".into(), full: false, index: None, fields: None, plugins: vec![] }];
        let targets = resolve_targets(&syncs, &PluginChain::empty(), &HashMap::new());
        assert_eq!(targets.len(), 1);
        assert!(targets[0].plugins.is_empty());
    }
}
