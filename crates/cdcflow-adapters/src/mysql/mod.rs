//! MySQL binlog cursor. Grounded on `mysql_async`'s binlog streaming API
//! (the dependency choice the `readyset` pack's `database-utils` crate
//! makes) and on `original_source/meilisync/source/mysql.py` for the
//! event-mapping semantics, with the two documented bugs fixed:
//! multi-row `WriteRowsEvent`/`UpdateRowsEvent`/`DeleteRowsEvent` payloads
//! now emit one `Event` per row instead of only `rows[0]` (SPEC_FULL.md
//! §9), and this is the sole source cursor that retries its own
//! transport (10s backoff, unbounded).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use cdcflow_domain::{Checkpoint, Event, EventType, ProgressEvent, SourceMessage, Sync};
use futures::stream::{self, BoxStream, StreamExt};
use mysql_async::binlog::events::{EventData, RowsEventData, TableMapEvent};
use mysql_async::{BinlogStreamRequest, Conn, OptsBuilder};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use cdcflow_core::source::{EventStream, RowBatchStream, SourceCursor};
use cdcflow_core::SourceError;

pub struct MySqlOptions {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: String,
    pub server_id: u32,
}

pub struct MySqlCursor {
    opts: MySqlOptions,
    tables: Vec<String>,
    checkpoint: Option<Checkpoint>,
}

impl MySqlCursor {
    pub async fn connect(opts: MySqlOptions, tables: Vec<String>, checkpoint: Option<Checkpoint>) -> Result<Self, SourceError> {
        // Fail fast on an unreachable server rather than discovering it
        // only once the engine starts consuming the stream.
        let cursor = Self { opts, tables, checkpoint };
        cursor.ping().await?;
        Ok(cursor)
    }

    fn conn_opts(&self) -> OptsBuilder {
        OptsBuilder::default()
            .ip_or_hostname(self.opts.host.clone())
            .tcp_port(self.opts.port)
            .user(self.opts.user.clone())
            .pass(self.opts.password.clone())
            .db_name(Some(self.opts.database.clone()))
    }

    async fn connect_conn(&self) -> Result<Conn, SourceError> {
        Conn::new(self.conn_opts()).await.map_err(|e| SourceError::connection(e))
    }

    async fn current_master_status(conn: &mut Conn) -> Result<(String, u64), SourceError> {
        use mysql_async::prelude::Queryable;
        let row: Option<(String, u64)> = conn
            .query_first("SHOW BINARY LOG STATUS")
            .await
            .or_else(|_| async { conn.query_first("SHOW MASTER STATUS").await })
            .await
            .map_err(|e| SourceError::protocol(e))?;
        row.ok_or_else(|| SourceError::protocol("server returned no binlog status row"))
    }
}

#[async_trait]
impl SourceCursor for MySqlCursor {
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
        use mysql_async::prelude::Queryable;
        let mut conn = self.connect_conn().await?;
        let fields = select_list(sync);
        let table = sync.table.clone();
        let pk = sync.pk.clone();

        let s = stream::unfold((conn, 0usize, false), move |(mut conn, offset, done)| {
            let fields = fields.clone();
            let table = table.clone();
            let pk = pk.clone();
            async move {
                if done {
                    return None;
                }
                let query = format!("SELECT {fields} FROM {table} ORDER BY {pk} LIMIT {batch_size} OFFSET {offset}");
                let rows: Vec<mysql_async::Row> = match conn.query(query).await {
                    Ok(r) => r,
                    Err(e) => return Some((Err(SourceError::protocol(e)), (conn, offset, true))),
                };
                if rows.is_empty() {
                    return None;
                }
                // `fields` already applied the rename via SQL aliasing, so
                // rows are keyed by destination name here — only value
                // normalization runs, never `cdcflow_policies::project`
                // (which expects source-name keys and would re-key against
                // the wrong map, dropping any renamed column).
                let projected: Vec<Map<String, Value>> = rows.iter().map(|r| normalize_row(&row_to_map(r))).collect();
                let next_offset = offset + batch_size;
                let finished = rows.len() < batch_size;
                Some((Ok(projected), (conn, next_offset, finished)))
            }
        });
        Ok(Box::pin(s))
    }

    async fn get_count(&self, sync: &Sync) -> Result<u64, SourceError> {
        use mysql_async::prelude::Queryable;
        let mut conn = self.connect_conn().await?;
        let count: Option<u64> = conn
            .query_first(format!("SELECT COUNT(*) FROM {}", sync.table))
            .await
            .map_err(|e| SourceError::protocol(e))?;
        Ok(count.unwrap_or(0))
    }

    async fn get_current_progress(&self) -> Result<Checkpoint, SourceError> {
        let mut conn = self.connect_conn().await?;
        let (file, pos) = Self::current_master_status(&mut conn).await?;
        Ok(Checkpoint::MySql { master_log_file: file, master_log_position: pos })
    }

    async fn ping(&self) -> Result<(), SourceError> {
        use mysql_async::prelude::Queryable;
        let mut conn = self.connect_conn().await?;
        conn.query_drop("SELECT 1").await.map_err(|e| SourceError::connection(e))
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

fn row_to_map(row: &mysql_async::Row) -> Map<String, Value> {
    let mut map = Map::new();
    for (i, column) in row.columns_ref().iter().enumerate() {
        let name = column.name_str().to_string();
        let value = row.as_ref(i).map(mysql_value_to_json).unwrap_or(Value::Null);
        map.insert(name, value);
    }
    map
}

/// `select_list` already renamed/dropped columns via SQL aliasing, so a row
/// here is keyed by destination name — only value normalization runs.
fn normalize_row(row: &Map<String, Value>) -> Map<String, Value> {
    row.iter().map(|(k, v)| (k.clone(), cdcflow_policies::normalize_value(v.clone()))).collect()
}

fn mysql_value_to_json(value: &mysql_async::Value) -> Value {
    use mysql_async::Value as V;
    match value {
        V::NULL => Value::Null,
        V::Bytes(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
        V::Int(i) => Value::Number((*i).into()),
        V::UInt(u) => Value::Number((*u).into()),
        V::Float(f) => serde_json::Number::from_f64(*f as f64).map(Value::Number).unwrap_or(Value::Null),
        V::Double(d) => serde_json::Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null),
        // mysql_async collapses both DATE and DATETIME columns into this
        // variant; a DATE value always carries an all-zero time component,
        // so that's the only signal available to tell them apart.
        V::Date(year, month, day, hour, min, sec, micro) => {
            if *hour == 0 && *min == 0 && *sec == 0 && *micro == 0 {
                Value::String(format!("{year:04}-{month:02}-{day:02}"))
            } else {
                Value::String(format!("{year:04}-{month:02}-{day:02}T{hour:02}:{min:02}:{sec:02}.{micro:06}Z"))
            }
        }
        V::Time(neg, days, hour, min, sec, micro) => {
            let sign = if *neg { "-" } else { "" };
            Value::String(format!("{sign}{days}d{hour:02}:{min:02}:{sec:02}.{micro:06}"))
        }
    }
}

async fn run_reader(cursor: MySqlCursor, tx: mpsc::Sender<Result<SourceMessage, SourceError>>) -> Result<(), SourceError> {
    let (mut file, mut pos) = match &cursor.checkpoint {
        Some(Checkpoint::MySql { master_log_file, master_log_position }) => (master_log_file.clone(), *master_log_position),
        _ => {
            let mut conn = cursor.connect_conn().await?;
            MySqlCursor::current_master_status(&mut conn).await?
        }
    };

    if tx
        .send(Ok(SourceMessage::Progress(ProgressEvent::new(Checkpoint::MySql {
            master_log_file: file.clone(),
            master_log_position: pos,
        }))))
        .await
        .is_err()
    {
        return Ok(());
    }

    let schema = cursor.opts.database.clone();
    let tables: std::collections::HashSet<String> = cursor.tables.iter().cloned().collect();

    loop {
        let result = consume_once(&cursor, &schema, &tables, &mut file, &mut pos, &tx).await;
        match result {
            Ok(()) => return Ok(()), // receiver dropped
            Err(SourceError::Transport(msg)) => {
                tracing::warn!(error = %msg, "mysql binlog transport error, reconnecting in 10s");
                tokio::time::sleep(Duration::from_secs(10)).await;
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn consume_once(
    cursor: &MySqlCursor,
    schema: &str,
    tables: &std::collections::HashSet<String>,
    file: &mut String,
    pos: &mut u64,
    tx: &mpsc::Sender<Result<SourceMessage, SourceError>>,
) -> Result<(), SourceError> {
    let conn = cursor.connect_conn().await.map_err(|e| SourceError::transport(e))?;
    let request = BinlogStreamRequest::new(cursor.opts.server_id)
        .with_filename(file.as_bytes())
        .with_pos(*pos as u32);
    let mut binlog_stream = conn.get_binlog_stream(request).await.map_err(|e| SourceError::transport(e))?;

    let mut table_maps: HashMap<u64, TableMapEvent<'static>> = HashMap::new();

    while let Some(event) = binlog_stream.next().await {
        let event = event.map_err(|e| SourceError::transport(e))?;
        // The event header's log_pos is the server's own authoritative
        // post-event file offset — not something this cursor should invent.
        let log_pos = event.header().log_pos() as u64;
        let data = match event.read_data() {
            Ok(Some(d)) => d,
            Ok(None) => continue,
            Err(e) => return Err(SourceError::protocol(e)),
        };
        match data {
            EventData::TableMapEvent(tme) => {
                table_maps.insert(tme.table_id(), tme.into_owned());
            }
            EventData::RowsEventData(rows_data) => {
                let (table_id, event_type) = match &rows_data {
                    RowsEventData::WriteRowsEvent(e) => (e.table_id(), EventType::Create),
                    RowsEventData::UpdateRowsEvent(e) => (e.table_id(), EventType::Update),
                    RowsEventData::DeleteRowsEvent(e) => (e.table_id(), EventType::Delete),
                    _ => continue,
                };
                let Some(tme) = table_maps.get(&table_id) else { continue };
                if tme.database_name() != schema {
                    continue;
                }
                let table_name = tme.table_name().to_string();
                if !tables.contains(&table_name) {
                    continue;
                }

                // One Event per row — the multi-row fix (SPEC_FULL.md §9).
                let rows = decode_rows(&rows_data, tme, event_type)?;
                *pos = log_pos;
                for data in rows {
                    let progress = Checkpoint::MySql { master_log_file: file.clone(), master_log_position: *pos };
                    let ev = Event::new(event_type, table_name.clone(), data, progress);
                    if tx.send(Ok(SourceMessage::Event(ev))).await.is_err() {
                        return Ok(());
                    }
                }
            }
            EventData::RotateEvent(rotate) => {
                *file = rotate.name().to_string();
                *pos = rotate.position();
            }
            _ => {}
        }
    }
    Err(SourceError::transport("binlog stream ended"))
}

fn decode_rows(rows_data: &RowsEventData<'_>, table_map: &TableMapEvent<'_>, event_type: EventType) -> Result<Vec<Map<String, Value>>, SourceError> {
    let mut out = Vec::new();
    match rows_data {
        RowsEventData::WriteRowsEvent(ev) => {
            for row in ev.rows(table_map) {
                let (_before, after) = row.map_err(|e| SourceError::protocol(e))?;
                if let Some(after) = after {
                    out.push(binlog_row_to_map(&after, table_map)?);
                }
            }
        }
        RowsEventData::DeleteRowsEvent(ev) => {
            for row in ev.rows(table_map) {
                let (before, _after) = row.map_err(|e| SourceError::protocol(e))?;
                if let Some(before) = before {
                    out.push(binlog_row_to_map(&before, table_map)?);
                }
            }
        }
        RowsEventData::UpdateRowsEvent(ev) => {
            for row in ev.rows(table_map) {
                let (_before, after) = row.map_err(|e| SourceError::protocol(e))?;
                if let Some(after) = after {
                    out.push(binlog_row_to_map(&after, table_map)?);
                }
            }
        }
        _ => {}
    }
    let _ = event_type;
    Ok(out)
}

fn binlog_row_to_map(row: &mysql_async::binlog::row::BinlogRow, table_map: &TableMapEvent<'_>) -> Result<Map<String, Value>, SourceError> {
    let mut map = Map::new();
    let column_count = row.len();
    for i in 0..column_count {
        let name = table_map
            .column_name(i)
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("col_{i}"));
        let value = row.as_ref(i).map(mysql_value_to_json).unwrap_or(Value::Null);
        map.insert(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_list_builds_rename_projection() {
        let mut fields = std::collections::HashMap::new();
        fields.insert("a".to_string(), Some("x".to_string()));
        fields.insert("b".to_string(), None);
        let sync = Sync {
            table: "t".into(),
            pk: "id".into(),
            full: false,
            index: None,
            fields: Some(fields),
            plugins: vec![],
        };
        let list = select_list(&sync);
        assert!(list.contains("a as x"));
        assert!(list.contains('b'));
    }

    #[test]
    fn select_list_is_star_when_unconfigured() {
        let sync = Sync { table: "t".into(), pk: "id".into(), full: false, index: None, fields: None, plugins: vec![] };
        assert_eq!(select_list(&sync), "*");
    }

    #[test]
    fn mysql_value_to_json_handles_bytes_and_null() {
        assert_eq!(mysql_value_to_json(&mysql_async::Value::NULL), Value::Null);
        assert_eq!(mysql_value_to_json(&mysql_async::Value::Bytes(b"hi".to_vec())), Value::String("hi".into()));
    }

    #[test]
    fn date_column_with_zero_time_stays_a_bare_date() {
        let v = mysql_value_to_json(&mysql_async::Value::Date(2021, 6, 15, 0, 0, 0, 0));
        assert_eq!(v, Value::String("2021-06-15".into()));
    }

    #[test]
    fn datetime_column_keeps_its_time_component() {
        let v = mysql_value_to_json(&mysql_async::Value::Date(2021, 6, 15, 12, 30, 0, 0));
        assert_eq!(v, Value::String("2021-06-15T12:30:00.000000Z".into()));
    }
}
