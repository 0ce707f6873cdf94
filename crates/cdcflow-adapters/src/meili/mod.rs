//! MeiliSearch sink writer: batched add/update/delete, plugin chain
//! application, and the full-refresh index-swap protocol (spec.md
//! §4.4/§4.4.1). Built against the `meilisearch-sdk` crate — the
//! ecosystem's maintained Rust client, chosen because hand-rolling the
//! MeiliSearch HTTP surface is explicitly out of scope (spec.md §1).

pub mod error;

use std::collections::HashMap;
use std::time::Duration;

use cdcflow_core::collection::{EventCollection, PartitionedEvents};
use cdcflow_core::plugin::{run_post, run_pre, PluginChain};
use cdcflow_domain::{Event, EventType, Sync};
use futures::future::try_join_all;
use futures::StreamExt;
use meilisearch_sdk::client::Client;
use meilisearch_sdk::settings::Settings;
use meilisearch_sdk::task_info::TaskInfo;
use serde_json::{Map, Value};

pub use error::SinkError;

/// One declared sync together with its plugin chain *definition*
/// (engine-global plugins, in declaration order, followed by this sync's
/// own plugins, in declaration order — spec.md §4.4's fixed ordering).
/// Built once at startup by `cdcflow-infra` via
/// `cdcflow_core::plugin::PluginChain::merge`. This is a definition, not a
/// materialized instance list — `handle_events_by_type` materializes a
/// fresh instance list per event so a `PerEvent` plugin slot really does
/// get a new instance for every event instead of one shared for the whole
/// target's lifetime.
pub struct SyncTarget {
    pub sync: Sync,
    pub plugins: PluginChain,
}

pub struct SinkWriter {
    client: Client,
    targets: Vec<SyncTarget>,
    task_timeout: Duration,
}

impl SinkWriter {
    pub fn new(api_url: &str, api_key: Option<&str>, targets: Vec<SyncTarget>, task_timeout_secs: u64) -> Result<Self, SinkError> {
        let client = Client::new(api_url, api_key)?;
        Ok(Self {
            client,
            targets,
            task_timeout: Duration::from_secs(task_timeout_secs),
        })
    }

    fn target(&self, table: &str) -> Option<&SyncTarget> {
        self.targets.iter().find(|t| t.sync.table == table)
    }

    /// Public lookup used by the `refresh` CLI command, which needs a
    /// sync's materialized plugin chain to drive `refresh_data` directly
    /// rather than through `handle_events`/`handle_event`.
    pub fn sync_target(&self, table: &str) -> Option<&SyncTarget> {
        self.target(table)
    }

    /// Awaits a MeiliSearch task, enforcing `task_timeout` ourselves rather
    /// than trusting the SDK's own timeout plumbing — a timeout here is
    /// fatal to the current operation, never retried (spec.md §4.4.1,
    /// §7 "Sink task timeout").
    async fn wait(&self, task: TaskInfo) -> Result<(), SinkError> {
        match tokio::time::timeout(self.task_timeout, self.client.wait_for_task(task, None, None)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(SinkError::Meili(e)),
            Err(_) => Err(SinkError::TaskTimeout),
        }
    }

    /// Wraps a batch of rows as synthetic `create` events and routes them
    /// through the same batched-create path `handle_events` uses, so
    /// plugin hooks apply uniformly to bootstrap data too (spec.md §4.4).
    ///
    /// `rows` arrive already projected by the source cursor's
    /// `get_full_data` (spec.md §4.1.4), so this path must not run them
    /// through `cdcflow_policies::project` a second time — doing so would
    /// look up already-renamed keys against `sync.fields`' *source* column
    /// names and silently drop any field whose destination name doesn't
    /// also happen to be a source column.
    pub async fn add_data(&self, table: &str, rows: Vec<Map<String, Value>>, progress: cdcflow_domain::Checkpoint) -> Result<(), SinkError> {
        let target = self.target(table).ok_or_else(|| SinkError::UnknownSync(table.to_string()))?;
        let events: Vec<Event> = rows
            .into_iter()
            .map(|data| Event::new(EventType::Create, table, data, progress.clone()))
            .collect();
        self.handle_events_by_type(target, EventType::Create, events, false).await
    }

    /// Single-event path used when no batching is configured
    /// (`insert_size`/`insert_interval` both unset). `event.data` is the raw
    /// row straight from the cursor, so projection still needs to run.
    pub async fn handle_event(&self, event: Event) -> Result<(), SinkError> {
        let target = self.target(&event.table).ok_or_else(|| SinkError::UnknownSync(event.table.clone()))?;
        let event_type = event.event_type;
        self.handle_events_by_type(target, event_type, vec![event], true).await
    }

    /// Drains the collection and, for each sync with buffered events,
    /// issues one batched call per event type in order create → update →
    /// delete (spec.md §4.4). Events came straight from the cursor's
    /// stream, so they still need projecting.
    pub async fn handle_events(&self, collection: &mut EventCollection) -> Result<(), SinkError> {
        let drained: HashMap<String, PartitionedEvents> = collection.pop_events();
        for (table, partitioned) in drained {
            let target = match self.target(&table) {
                Some(t) => t,
                None => continue,
            };
            if !partitioned.create.is_empty() {
                self.handle_events_by_type(target, EventType::Create, partitioned.create, true).await?;
            }
            if !partitioned.update.is_empty() {
                self.handle_events_by_type(target, EventType::Update, partitioned.update, true).await?;
            }
            if !partitioned.delete.is_empty() {
                self.handle_events_by_type(target, EventType::Delete, partitioned.delete, true).await?;
            }
        }
        Ok(())
    }

    /// Runs `pre_event` over every event, issues the single batched sink
    /// call for `event_type`, then runs `post_event` over every event.
    /// Pre-hooks can rewrite an event's `data` but cannot veto its
    /// inclusion in the batch (documented future extension, spec.md §4.4).
    ///
    /// Each event gets its own freshly materialized instance list, paired
    /// through both its `pre_event` and `post_event` call — a `PerEvent`
    /// plugin slot must see exactly one event per instance, not the whole
    /// batch.
    ///
    /// `project_fields` is false only for the bootstrap `add_data` path,
    /// whose rows are already projected by the cursor's `get_full_data`.
    async fn handle_events_by_type(&self, target: &SyncTarget, event_type: EventType, events: Vec<Event>, project_fields: bool) -> Result<(), SinkError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut pre_events = Vec::with_capacity(events.len());
        for event in events {
            let instances = target.plugins.materialize();
            let event = run_pre(&instances, event).await.map_err(SinkError::Plugin)?;
            pre_events.push((instances, event));
        }

        let index = self.client.index(target.sync.index_name());
        let pk = target.sync.pk.as_str();
        let doc_for = |e: &Event| {
            if project_fields {
                cdcflow_policies::project(&e.data, &target.sync.fields)
            } else {
                e.data.clone()
            }
        };
        match event_type {
            EventType::Create => {
                let docs: Vec<Map<String, Value>> = pre_events.iter().map(|(_, e)| doc_for(e)).collect();
                let task = index.add_documents(&docs, Some(pk)).await?;
                self.wait(task).await?;
            }
            EventType::Update => {
                let docs: Vec<Map<String, Value>> = pre_events.iter().map(|(_, e)| doc_for(e)).collect();
                let task = index.update_documents(&docs, Some(pk)).await?;
                self.wait(task).await?;
            }
            EventType::Delete => {
                let ids: Vec<String> = pre_events
                    .iter()
                    .filter_map(|(_, e)| e.pk_value(pk))
                    .map(pk_to_string)
                    .collect();
                let task = index.delete_documents(&ids).await?;
                self.wait(task).await?;
            }
        }

        for (instances, event) in pre_events {
            run_post(&instances, event).await.map_err(SinkError::Plugin)?;
        }
        Ok(())
    }

    /// Row/document count for an index, from its stats.
    pub async fn get_count(&self, index: &str) -> Result<u64, SinkError> {
        let stats = self.client.index(index).get_stats().await?;
        Ok(stats.number_of_documents as u64)
    }

    /// Translates "index not found" to `false`; any other wire error
    /// propagates.
    pub async fn index_exists(&self, index: &str) -> Result<bool, SinkError> {
        match self.client.get_index(index).await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = SinkError::Meili(e);
                if err.is_index_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Full-refresh via atomic index swap (spec.md §4.4.1). `full_data` is
    /// the already-projected row batches from a source cursor's
    /// `get_full_data`. Search traffic against `index` never observes a
    /// partially-populated index: it sees either the pre-refresh or
    /// post-refresh state, because the only mutation visible to `index`
    /// itself is the atomic `swap_indexes` call at the very end.
    pub async fn refresh_data<S>(&self, target: &SyncTarget, mut full_data: S, keep_index: bool) -> Result<(), SinkError>
    where
        S: futures::Stream<Item = Result<Vec<Map<String, Value>>, cdcflow_core::SourceError>> + Unpin,
    {
        let index_name = target.sync.index_name().to_string();
        let pk = target.sync.pk.clone();

        if keep_index {
            while let Some(batch) = full_data.next().await {
                let batch = batch?;
                if batch.is_empty() {
                    continue;
                }
                let task = self.client.index(&index_name).add_documents(&batch, Some(&pk)).await?;
                self.wait(task).await?;
            }
            return Ok(());
        }

        let tmp_name = format!("{index_name}_tmp");

        if let Err(e) = self.client.delete_index(&tmp_name).await {
            let err = SinkError::Meili(e);
            if !err.is_index_not_found() {
                return Err(err);
            }
        }

        let settings: Settings = self.client.index(&index_name).get_settings().await.unwrap_or_default();

        let create_task = self.client.create_index(&tmp_name, Some(&pk)).await?;
        self.wait(create_task).await?;

        let settings_task = self.client.index(&tmp_name).set_settings(&settings).await?;
        self.wait(settings_task).await?;

        let tmp_index = self.client.index(&tmp_name);
        let mut add_tasks = Vec::new();
        while let Some(batch) = full_data.next().await {
            let batch = batch?;
            if batch.is_empty() {
                continue;
            }
            // Enqueue the batch now (each `.await` here returns as soon as
            // MeiliSearch accepts the task, not once it's processed), and
            // wait on all enqueued tasks together once every batch is in.
            let task = tmp_index.add_documents(&batch, Some(&pk)).await?;
            add_tasks.push(task);
        }
        try_join_all(add_tasks.into_iter().map(|task| self.wait(task))).await?;

        let swap_task = self.client.swap_indexes(&[(index_name.as_str(), tmp_name.as_str())]).await?;
        self.wait(swap_task).await?;

        self.client.delete_index(&tmp_name).await?;
        Ok(())
    }
}

/// MeiliSearch document ids are strings; a numeric primary key is
/// coerced through its JSON text form without surrounding quotes.
fn pk_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pk_to_string_strips_quotes_for_strings() {
        assert_eq!(pk_to_string(&Value::String("abc".into())), "abc");
        assert_eq!(pk_to_string(&serde_json::json!(42)), "42");
    }
}
