//! Postgres logical-replication cursor, built on a regular SQL connection
//! against `pg_logical_slot_get_changes` with the `wal2json` output plugin —
//! the same "no raw replication protocol" shape the pack's `surreal-sync`
//! postgresql crate uses, simpler and safer than decoding the streaming
//! replication wire format by hand for a JSON-producing plugin. Event
//! semantics are grounded on `original_source/meilisync/source/postgres.py`,
//! with the documented per-message table filter bug fixed to filter
//! per-change instead (SPEC_FULL.md §9: a `continue` inside the per-change
//! loop, not a `return` out of the whole message).

pub mod wal2json;

use std::time::Duration;

use async_trait::async_trait;
use cdcflow_domain::{Checkpoint, Event, ProgressEvent, SourceMessage, Sync};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_postgres::{Client, NoTls};

use cdcflow_core::source::{EventStream, RowBatchStream, SourceCursor};
use cdcflow_core::SourceError;

use wal2json::parse_changes;

pub struct PostgresOptions {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
    pub slot_name: String,
}

pub struct PostgresCursor {
    opts: PostgresOptions,
    tables: Vec<String>,
    checkpoint: Option<Checkpoint>,
}

impl PostgresCursor {
    pub async fn connect(opts: PostgresOptions, tables: Vec<String>, checkpoint: Option<Checkpoint>) -> Result<Self, SourceError> {
        let cursor = Self { opts, tables, checkpoint };
        cursor.ping().await?;
        Ok(cursor)
    }

    fn conn_string(&self) -> String {
        let mut s = format!("host={} port={} user={} dbname={}", self.opts.host, self.opts.port, self.opts.user, self.opts.database);
        if let Some(pw) = &self.opts.password {
            s.push_str(&format!(" password={pw}"));
        }
        s
    }

    async fn connect_client(&self) -> Result<Client, SourceError> {
        let (client, connection) = tokio_postgres::connect(&self.conn_string(), NoTls).await.map_err(|e| SourceError::connection(e))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "postgres connection task exited");
            }
        });
        Ok(client)
    }

    async fn current_wal_lsn(client: &Client) -> Result<String, SourceError> {
        let row = client
            .query_one("SELECT pg_current_wal_lsn()::text", &[])
            .await
            .map_err(|e| SourceError::protocol(e))?;
        Ok(row.get(0))
    }

    async fn ensure_slot(&self, client: &Client) -> Result<(), SourceError> {
        let exists: bool = client
            .query_one("SELECT EXISTS(SELECT 1 FROM pg_replication_slots WHERE slot_name = $1)", &[&self.opts.slot_name])
            .await
            .map_err(|e| SourceError::protocol(e))?
            .get(0);
        if !exists {
            client
                .execute(&format!("SELECT pg_create_logical_replication_slot('{}', 'wal2json')", self.opts.slot_name), &[])
                .await
                .map_err(|e| SourceError::protocol(e))?;
        }
        Ok(())
    }

    /// Advances the slot to a position already confirmed durable (a
    /// restored checkpoint), so the non-destructive peek loop in
    /// `run_reader` never re-delivers changes the sink already applied in a
    /// prior run, without ever dropping anything that wasn't confirmed.
    async fn advance_slot(&self, client: &Client, upto_lsn: &str) -> Result<(), SourceError> {
        client
            .query_one(
                "SELECT pg_replication_slot_advance($1, $2::pg_lsn)",
                &[&self.opts.slot_name, &upto_lsn],
            )
            .await
            .map_err(|e| SourceError::protocol(e))?;
        Ok(())
    }
}

#[async_trait]
impl SourceCursor for PostgresCursor {
    fn stream(self: Box<Self>) -> EventStream {
        let (tx, rx) = mpsc::channel::<Result<SourceMessage, SourceError>>(1024);
        tokio::spawn(async move {
            if let Err(e) = run_reader(*self, tx.clone()).await {
                let _ = tx.send(Err(e)).await;
            }
        });
        Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx))
    }

    async fn get_full_data<'a>(&'a self, sync: &'a Sync, batch_size: usize) -> Result<RowBatchStream<'a>, SourceError> {
        let client = self.connect_client().await?;
        let fields = select_list(sync);
        let table = sync.table.clone();

        let s = stream::unfold((client, 0i64, false), move |(client, offset, done)| {
            let fields = fields.clone();
            let table = table.clone();
            async move {
                if done {
                    return None;
                }
                let query = format!("SELECT {fields} FROM {table} LIMIT {batch_size} OFFSET {offset}");
                let rows = match client.query(&query, &[]).await {
                    Ok(r) => r,
                    Err(e) => return Some((Err(SourceError::protocol(e)), (client, offset, true))),
                };
                if rows.is_empty() {
                    return None;
                }
                // `fields` already applied the rename via SQL aliasing, so
                // rows are keyed by destination name here — only value
                // normalization runs, never `cdcflow_policies::project`
                // (which expects source-name keys and would re-key against
                // the wrong map, dropping any renamed column).
                let projected: Vec<Map<String, Value>> = rows.iter().map(|r| normalize_row(&pg_row_to_map(r))).collect();
                let next_offset = offset + batch_size as i64;
                let finished = rows.len() < batch_size;
                Some((Ok(projected), (client, next_offset, finished)))
            }
        });
        Ok(Box::pin(s))
    }

    async fn get_count(&self, sync: &Sync) -> Result<u64, SourceError> {
        let client = self.connect_client().await?;
        let row = client
            .query_one(&format!("SELECT COUNT(*) FROM {}", sync.table), &[])
            .await
            .map_err(|e| SourceError::protocol(e))?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    async fn get_current_progress(&self) -> Result<Checkpoint, SourceError> {
        let client = self.connect_client().await?;
        let lsn = Self::current_wal_lsn(&client).await?;
        Ok(Checkpoint::Postgres { start_lsn: lsn })
    }

    async fn ping(&self) -> Result<(), SourceError> {
        let client = self.connect_client().await?;
        client.query_one("SELECT 1", &[]).await.map_err(|e| SourceError::connection(e))?;
        Ok(())
    }
}

fn select_list(sync: &Sync) -> String {
    match &sync.fields {
        Some(fields) if !fields.is_empty() => fields
            .iter()
            .map(|(src, dst)| match dst {
                Some(d) => format!("{src} as {d}"),
                None => src.clone(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        _ => "*".to_string(),
    }
}

fn pg_row_to_map(row: &tokio_postgres::Row) -> Map<String, Value> {
    let mut map = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let value: Value = row.try_get::<_, Option<Value>>(i).ok().flatten().unwrap_or(Value::Null);
        map.insert(name, value);
    }
    map
}

/// `select_list` already renamed/dropped columns via SQL aliasing, so a row
/// here is keyed by destination name — only value normalization runs.
fn normalize_row(row: &Map<String, Value>) -> Map<String, Value> {
    row.iter().map(|(k, v)| (k.clone(), cdcflow_policies::normalize_value(v.clone()))).collect()
}

async fn run_reader(cursor: PostgresCursor, tx: mpsc::Sender<Result<SourceMessage, SourceError>>) -> Result<(), SourceError> {
    let client = cursor.connect_client().await?;
    cursor.ensure_slot(&client).await.or_else(|e| {
        // a concurrent creator racing us for the same slot name is fine
        if e.to_string().contains("already exists") {
            Ok(())
        } else {
            Err(e)
        }
    })?;

    let start_lsn = match &cursor.checkpoint {
        Some(Checkpoint::Postgres { start_lsn }) => {
            // Only ever advance to a position already confirmed persisted —
            // never consume past what a prior run is known to have applied.
            cursor.advance_slot(&client, start_lsn).await?;
            start_lsn.clone()
        }
        _ => PostgresCursor::current_wal_lsn(&client).await?,
    };

    if tx
        .send(Ok(SourceMessage::Progress(ProgressEvent::new(Checkpoint::Postgres { start_lsn: start_lsn.clone() }))))
        .await
        .is_err()
    {
        return Ok(());
    }

    let tables: std::collections::HashSet<String> = cursor.tables.iter().cloned().collect();

    loop {
        // Peek, not get: a destructive read would drop changes the sink
        // hasn't actually persisted yet if this process dies mid-batch.
        // The slot only ever advances in `advance_slot`, seeded from a
        // checkpoint already known durable.
        let query = format!(
            "SELECT data FROM pg_logical_slot_peek_changes('{}', NULL, NULL, 'include-lsn', 'true')",
            cursor.opts.slot_name
        );
        let rows = client.query(&query, &[]).await.map_err(|e| SourceError::protocol(e))?;
        if rows.is_empty() {
            tokio::time::sleep(Duration::from_millis(500)).await;
            continue;
        }
        let mut delivered_lsn = None;
        for row in &rows {
            let payload: String = row.get(0);
            let parsed = parse_changes(&payload).map_err(|e| SourceError::protocol(e))?;
            for change in parsed.changes {
                // per-change filtering — the original's `return` skipped the
                // remaining changes in the same WAL transaction (SPEC_FULL.md §9).
                if !tables.contains(&change.table) {
                    continue;
                }
                let next_lsn = parsed.next_lsn.clone().unwrap_or_else(|| start_lsn.clone());
                let progress = Checkpoint::Postgres { start_lsn: next_lsn.clone() };
                let event = Event::new(change.event_type, change.table, change.data, progress);
                if tx.send(Ok(SourceMessage::Event(event))).await.is_err() {
                    return Ok(());
                }
                delivered_lsn = Some(next_lsn);
            }
        }
        // Advance only after the batch has been handed off, so a crash
        // between peek and delivery leaves the slot untouched and the next
        // run re-peeks the same changes instead of losing them.
        if let Some(lsn) = delivered_lsn {
            cursor.advance_slot(&client, &lsn).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_list_is_star_when_unconfigured() {
        let sync = Sync { table: "t".into(), pk: "id".into(), full: false, index: None, fields: None, plugins: vec![] };
        assert_eq!(select_list(&sync), "*");
    }
}
