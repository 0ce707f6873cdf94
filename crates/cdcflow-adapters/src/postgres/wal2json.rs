//! Parses `wal2json`'s JSON change-document text, grounded on
//! `original_source/meilisync/source/postgres.py`'s `_consumer` which reads
//! the same `change`/`nextlsn` shape.

use cdcflow_domain::EventType;
use serde::Deserialize;
use serde_json::{Map, Value};

pub struct ParsedChange {
    pub table: String,
    pub event_type: EventType,
    pub data: Map<String, Value>,
}

pub struct ParsedChanges {
    pub changes: Vec<ParsedChange>,
    pub next_lsn: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Wal2JsonDocument {
    #[serde(default)]
    change: Vec<Wal2JsonChange>,
    #[serde(default)]
    nextlsn: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Wal2JsonChange {
    kind: String,
    table: String,
    #[serde(default)]
    columnnames: Vec<String>,
    #[serde(default)]
    columntypes: Vec<String>,
    #[serde(default)]
    columnvalues: Vec<Value>,
    #[serde(default)]
    oldkeys: Option<Wal2JsonOldKeys>,
}

#[derive(Debug, Deserialize)]
struct Wal2JsonOldKeys {
    #[serde(rename = "keynames", default)]
    key_names: Vec<String>,
    #[serde(rename = "keyvalues", default)]
    key_values: Vec<Value>,
}

pub fn parse_changes(payload: &str) -> Result<ParsedChanges, serde_json::Error> {
    let doc: Wal2JsonDocument = serde_json::from_str(payload)?;
    let mut changes = Vec::with_capacity(doc.change.len());
    for change in doc.change {
        let event_type = match change.kind.as_str() {
            "insert" => EventType::Create,
            "update" => EventType::Update,
            "delete" => EventType::Delete,
            _ => continue,
        };
        let data = if event_type == EventType::Delete {
            match change.oldkeys {
                Some(keys) => zip_columns(&keys.key_names, &keys.key_values),
                None => Map::new(),
            }
        } else {
            let mut zipped = zip_columns(&change.columnnames, &change.columnvalues);
            unmarshal_json_columns(&mut zipped, &change.columnnames, &change.columntypes);
            zipped
        };
        changes.push(ParsedChange { table: change.table, event_type, data });
    }
    Ok(ParsedChanges { changes, next_lsn: doc.nextlsn })
}

fn zip_columns(names: &[String], values: &[Value]) -> Map<String, Value> {
    names.iter().cloned().zip(values.iter().cloned()).collect()
}

/// wal2json carries `json`/`jsonb` column values as their string text by
/// default; a declared `json`/`jsonb` column whose zipped value is still a
/// string gets re-parsed into a structured value here (spec.md §4.1.1:
/// "Column values of declared type json are parsed from string to
/// structured value"). A column type isn't reported for `oldkeys`, so this
/// only runs on the insert/update path.
fn unmarshal_json_columns(data: &mut Map<String, Value>, names: &[String], types: &[String]) {
    for (name, ty) in names.iter().zip(types.iter()) {
        if !ty.starts_with("json") {
            continue;
        }
        if let Some(Value::String(raw)) = data.get(name) {
            if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
                data.insert(name.clone(), parsed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_insert_change() {
        let payload = r#"{
            "change": [{"kind": "insert", "schema": "public", "table": "orders",
                "columnnames": ["id", "name"], "columnvalues": [1, "a"]}],
            "nextlsn": "0/16B3748"
        }"#;
        let parsed = parse_changes(payload).unwrap();
        assert_eq!(parsed.changes.len(), 1);
        assert_eq!(parsed.changes[0].table, "orders");
        assert_eq!(parsed.changes[0].event_type, EventType::Create);
        assert_eq!(parsed.changes[0].data.get("name").unwrap(), "a");
        assert_eq!(parsed.next_lsn.as_deref(), Some("0/16B3748"));
    }

    #[test]
    fn parses_delete_change_from_oldkeys() {
        let payload = r#"{
            "change": [{"kind": "delete", "schema": "public", "table": "orders",
                "oldkeys": {"keynames": ["id"], "keyvalues": [7]}}]
        }"#;
        let parsed = parse_changes(payload).unwrap();
        assert_eq!(parsed.changes[0].event_type, EventType::Delete);
        assert_eq!(parsed.changes[0].data.get("id").unwrap(), 7);
    }

    #[test]
    fn unknown_kind_is_skipped() {
        let payload = r#"{"change": [{"kind": "truncate", "table": "orders"}]}"#;
        let parsed = parse_changes(payload).unwrap();
        assert!(parsed.changes.is_empty());
    }

    #[test]
    fn json_column_is_unmarshalled_from_its_string_form() {
        let payload = r#"{
            "change": [{"kind": "insert", "schema": "public", "table": "test",
                "columnnames": ["id", "age", "data_json"],
                "columntypes": ["integer", "integer", "json"],
                "columnvalues": [1, 18, "{\"name\":\"test data\"}"]}],
            "nextlsn": "0/16B3748"
        }"#;
        let parsed = parse_changes(payload).unwrap();
        let data = &parsed.changes[0].data;
        assert_eq!(data.get("data_json").unwrap(), &serde_json::json!({"name": "test data"}));
        assert_eq!(data.get("age").unwrap(), 18);
    }

    #[test]
    fn json_column_already_structured_is_left_unchanged() {
        let payload = r#"{
            "change": [{"kind": "insert", "table": "test",
                "columnnames": ["data_json"],
                "columntypes": ["jsonb"],
                "columnvalues": [{"name": "already parsed"}]}]
        }"#;
        let parsed = parse_changes(payload).unwrap();
        assert_eq!(parsed.changes[0].data.get("data_json").unwrap(), &serde_json::json!({"name": "already parsed"}));
    }
}
