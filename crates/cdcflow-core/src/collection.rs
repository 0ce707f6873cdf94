use std::collections::HashMap;

use cdcflow_domain::{Event, EventType, Sync};

/// The three per-event-type lists a single `pop_events` drain produces for
/// one sync's table. Ordering within each list is unspecified.
#[derive(Debug, Default, Clone)]
pub struct PartitionedEvents {
    pub create: Vec<Event>,
    pub update: Vec<Event>,
    pub delete: Vec<Event>,
}

impl PartitionedEvents {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Per-sync coalescing buffer keyed by primary key. Inserting an event for
/// an already-present primary key replaces the prior event: last-writer-
/// wins per key, per sync. Not thread-safe by design — the replication
/// engine serializes access through its own mutex (spec.md §4.3).
#[derive(Debug, Default)]
pub struct EventCollection {
    // table name -> (stringified pk value -> event)
    buckets: HashMap<String, HashMap<String, Event>>,
    size: usize,
}

impl EventCollection {
    pub fn new() -> Self {
        Self { buckets: HashMap::new(), size: 0 }
    }

    /// O(1): total number of buffered events across every sync.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// O(1). Replaces any event already buffered for this event's primary
    /// key under `sync`; the size counter is only incremented when the key
    /// was previously absent, so a coalesced overwrite never double-counts.
    pub fn add_event(&mut self, sync: &Sync, event: Event) {
        let key = pk_key(&event, &sync.pk);
        let bucket = self.buckets.entry(sync.table.clone()).or_default();
        if bucket.insert(key, event).is_none() {
            self.size += 1;
        }
    }

    /// O(n). Atomically drains every buffered event, partitioned by event
    /// type per sync table, and resets `size` to 0.
    pub fn pop_events(&mut self) -> HashMap<String, PartitionedEvents> {
        let buckets = std::mem::take(&mut self.buckets);
        self.size = 0;
        buckets
            .into_iter()
            .map(|(table, events)| {
                let mut partitioned = PartitionedEvents::default();
                for (_, event) in events {
                    match event.event_type {
                        EventType::Create => partitioned.create.push(event),
                        EventType::Update => partitioned.update.push(event),
                        EventType::Delete => partitioned.delete.push(event),
                    }
                }
                (table, partitioned)
            })
            .collect()
    }
}

fn pk_key(event: &Event, pk: &str) -> String {
    event.data.get(pk).map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdcflow_domain::Checkpoint;
    use serde_json::json;

    fn sync(table: &str) -> Sync {
        Sync { table: table.into(), pk: "id".into(), full: false, index: None, fields: None, plugins: vec![] }
    }

    fn event(ty: EventType, id: i64, v: i64) -> Event {
        let mut data = serde_json::Map::new();
        data.insert("id".into(), json!(id));
        data.insert("v".into(), json!(v));
        Event::new(ty, "t", data, Checkpoint::Postgres { start_lsn: "0/0".into() })
    }

    #[test]
    fn last_writer_wins_per_key() {
        let mut c = EventCollection::new();
        let s = sync("t");
        c.add_event(&s, event(EventType::Create, 7, 1));
        c.add_event(&s, event(EventType::Update, 7, 2));
        c.add_event(&s, event(EventType::Update, 7, 3));
        c.add_event(&s, event(EventType::Update, 7, 4));
        assert_eq!(c.size(), 1);
        let drained = c.pop_events();
        let part = &drained["t"];
        assert_eq!(part.update.len(), 1);
        assert_eq!(part.update[0].data["v"], json!(4));
        assert!(part.create.is_empty());
        assert_eq!(c.size(), 0);
    }

    #[test]
    fn create_then_delete_nets_to_delete_only() {
        let mut c = EventCollection::new();
        let s = sync("t");
        c.add_event(&s, event(EventType::Create, 8, 1));
        c.add_event(&s, event(EventType::Delete, 8, 1));
        assert_eq!(c.size(), 1);
        let drained = c.pop_events();
        let part = &drained["t"];
        assert!(part.create.is_empty());
        assert_eq!(part.delete.len(), 1);
    }

    #[test]
    fn distinct_keys_each_counted() {
        let mut c = EventCollection::new();
        let s = sync("t");
        c.add_event(&s, event(EventType::Create, 1, 1));
        c.add_event(&s, event(EventType::Create, 2, 1));
        assert_eq!(c.size(), 2);
    }

    #[test]
    fn pop_resets_size_and_buckets() {
        let mut c = EventCollection::new();
        let s = sync("t");
        c.add_event(&s, event(EventType::Create, 1, 1));
        let _ = c.pop_events();
        assert_eq!(c.size(), 0);
        assert!(c.pop_events().is_empty());
    }

    #[test]
    fn buckets_separated_by_sync_table() {
        let mut c = EventCollection::new();
        c.add_event(&sync("a"), event(EventType::Create, 1, 1));
        c.add_event(&sync("b"), event(EventType::Create, 1, 1));
        let drained = c.pop_events();
        assert!(drained.contains_key("a"));
        assert!(drained.contains_key("b"));
    }
}
