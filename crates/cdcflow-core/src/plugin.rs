use std::sync::Arc;

use async_trait::async_trait;
use cdcflow_domain::Event;

use crate::errors::CoreError;

/// A single pre/post transform hook around an event. Errors are fatal for
/// that event — the engine surfaces them rather than skipping the event
/// silently (spec.md §7, "Plugin exception").
#[async_trait]
pub trait Plugin: Send + Sync {
    async fn pre_event(&self, event: Event) -> Result<Event, CoreError>;
    async fn post_event(&self, event: Event) -> Result<Event, CoreError>;
}

/// Builds a fresh `Plugin` instance for a "per-event" chain slot.
pub trait PluginFactory: Send + Sync {
    fn create(&self) -> Arc<dyn Plugin>;
}

/// One chain position: either a single long-lived instance reused across
/// every event ("global"), or a factory invoked fresh for each event
/// ("per-event"). This is the `is_global` flag from spec.md §3 turned into
/// a construction-time choice instead of a runtime branch.
#[derive(Clone)]
pub enum PluginSlot {
    Global(Arc<dyn Plugin>),
    PerEvent(Arc<dyn PluginFactory>),
}

/// An ordered plugin chain applied around one event. Per spec.md §4.4, the
/// effective chain for a sync is all engine-global plugins (in declaration
/// order) followed by all per-sync plugins (in declaration order) —
/// callers build that ordering with `PluginChain::merge` before handing it
/// to the sink writer.
///
/// A `PluginChain` is a *definition*, not a materialized instance list — a
/// `PerEvent` slot's factory isn't invoked until `materialize` runs, which
/// callers must do fresh for each event so "per-event" actually means one
/// instance per event, not one instance for the whole chain's lifetime.
#[derive(Clone)]
pub struct PluginChain {
    slots: Vec<PluginSlot>,
}

impl PluginChain {
    pub fn new(slots: Vec<PluginSlot>) -> Self {
        Self { slots }
    }

    pub fn empty() -> Self {
        Self { slots: Vec::new() }
    }

    /// Global plugins first, then this sync's own plugins — spec.md §4.4's
    /// fixed ordering rule. Combines the slot *definitions*; no plugin is
    /// constructed until `materialize` is called.
    pub fn merge(global: &PluginChain, per_sync: &PluginChain) -> PluginChain {
        let mut slots = global.slots.clone();
        slots.extend(per_sync.slots.iter().cloned());
        PluginChain { slots }
    }

    /// Builds the concrete instance list for one event: global slots clone
    /// their shared `Arc`, per-event slots invoke their factory fresh.
    /// Callers must call this once per event, not once and reuse the
    /// result — that's what keeps `PerEvent` semantics actually per-event.
    pub fn materialize(&self) -> Vec<Arc<dyn Plugin>> {
        self.slots
            .iter()
            .map(|slot| match slot {
                PluginSlot::Global(p) => p.clone(),
                PluginSlot::PerEvent(f) => f.create(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Runs `pre_event` across every instance in order. The returned instance
/// list must be passed back to `run_post` unchanged so that a per-event
/// plugin's state (if any) survives from pre to post for this one event.
pub async fn run_pre(instances: &[Arc<dyn Plugin>], mut event: Event) -> Result<Event, CoreError> {
    for plugin in instances {
        event = plugin.pre_event(event).await?;
    }
    Ok(event)
}

pub async fn run_post(instances: &[Arc<dyn Plugin>], mut event: Event) -> Result<Event, CoreError> {
    for plugin in instances {
        event = plugin.post_event(event).await?;
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdcflow_domain::Checkpoint;

    struct UppercaseTable;

    #[async_trait]
    impl Plugin for UppercaseTable {
        async fn pre_event(&self, mut event: Event) -> Result<Event, CoreError> {
            event.table = event.table.to_uppercase();
            Ok(event)
        }
        async fn post_event(&self, event: Event) -> Result<Event, CoreError> {
            Ok(event)
        }
    }

    fn sample_event() -> Event {
        Event::new(cdcflow_domain::EventType::Create, "orders", serde_json::Map::new(), Checkpoint::Postgres { start_lsn: "0/0".into() })
    }

    #[tokio::test]
    async fn global_then_per_sync_ordering() {
        let global = PluginChain::new(vec![PluginSlot::Global(Arc::new(UppercaseTable))]);
        let per_sync = PluginChain::empty();
        let merged = PluginChain::merge(&global, &per_sync);
        let instances = merged.materialize();
        let event = run_pre(&instances, sample_event()).await.unwrap();
        assert_eq!(event.table, "ORDERS");
    }

    #[tokio::test]
    async fn per_event_factory_builds_fresh_instance_each_time() {
        struct CountingFactory(std::sync::atomic::AtomicUsize);
        impl PluginFactory for CountingFactory {
            fn create(&self) -> Arc<dyn Plugin> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Arc::new(UppercaseTable)
            }
        }
        let factory = Arc::new(CountingFactory(std::sync::atomic::AtomicUsize::new(0)));
        let chain = PluginChain::new(vec![PluginSlot::PerEvent(factory.clone())]);
        let _ = chain.materialize();
        let _ = chain.materialize();
        assert_eq!(factory.0.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_chain_passes_event_through_unchanged() {
        let merged = PluginChain::merge(&PluginChain::empty(), &PluginChain::empty());
        let event = sample_event();
        let table = event.table.clone();
        let out = run_pre(&merged.materialize(), event).await.unwrap();
        assert_eq!(out.table, table);
    }

    #[tokio::test]
    async fn merge_preserves_chain_definition_across_materializations() {
        struct CountingFactory(std::sync::atomic::AtomicUsize);
        impl PluginFactory for CountingFactory {
            fn create(&self) -> Arc<dyn Plugin> {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Arc::new(UppercaseTable)
            }
        }
        let factory = Arc::new(CountingFactory(std::sync::atomic::AtomicUsize::new(0)));
        let global = PluginChain::new(vec![PluginSlot::Global(Arc::new(UppercaseTable))]);
        let per_sync = PluginChain::new(vec![PluginSlot::PerEvent(factory.clone())]);
        let merged = PluginChain::merge(&global, &per_sync);

        let _ = merged.materialize();
        let _ = merged.materialize();
        // Each materialize() call invokes the per-event factory again —
        // the merged chain is a definition, not a cached instance list.
        assert_eq!(factory.0.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
