//! Field projection/rename and timestamp normalization — the one value
//! transform this pump performs beyond moving rows verbatim (spec.md
//! §4.1.4). Pure, synchronous, and shared by every source adapter's full-
//! data path and by each cursor's per-event mapping step.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};

/// Applies `sync.fields` projection/rename to one row, with timestamp/date
/// normalization applied to every surviving value.
///
/// - `fields` absent or empty: the row passes through unchanged (values
///   still normalized).
/// - Otherwise: for each source column `k` present in `fields`, the value is
///   emitted under `fields[k]` (or `k` itself when the mapped value is
///   `null`); columns not listed in `fields` are dropped.
/// - If the projection would produce an empty map, the original row is
///   forwarded verbatim instead — a deliberately preserved defensive
///   fallback (spec.md §4.1.4).
pub fn project(row: &Map<String, Value>, fields: &Option<HashMap<String, Option<String>>>) -> Map<String, Value> {
    let passthrough = |row: &Map<String, Value>| row.iter().map(|(k, v)| (k.clone(), normalize_value(v.clone()))).collect();

    match fields {
        None => passthrough(row),
        Some(f) if f.is_empty() => passthrough(row),
        Some(f) => {
            let mut out = Map::new();
            for (k, v) in row {
                if let Some(rename) = f.get(k) {
                    let dst = rename.clone().unwrap_or_else(|| k.clone());
                    out.insert(dst, normalize_value(v.clone()));
                }
            }
            if out.is_empty() {
                passthrough(row)
            } else {
                out
            }
        }
    }
}

/// A datetime-shaped string (RFC 3339, with a time component) is rewritten
/// to integer Unix seconds; a plain `YYYY-MM-DD` date string is kept as an
/// ISO date string (re-formatted for normalization, not merely passed
/// through). Anything else is returned unchanged.
///
/// Sub-second precision is intentionally discarded converting to Unix
/// seconds — a documented limitation, not a bug (spec.md §9).
pub fn normalize_value(value: Value) -> Value {
    if let Value::String(s) = &value {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Value::Number(dt.timestamp().into());
        }
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Value::String(date.format("%Y-%m-%d").to_string());
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Option<&str>)]) -> HashMap<String, Option<String>> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.map(|s| s.to_string()))).collect()
    }

    #[test]
    fn projects_and_renames_per_configured_fields() {
        let row: Map<String, Value> = serde_json::from_value(json!({"a": 1, "b": 2, "c": 3})).unwrap();
        let f = Some(fields(&[("a", Some("x")), ("b", None)]));
        let out = project(&row, &f);
        assert_eq!(out, serde_json::from_value::<Map<String, Value>>(json!({"x": 1, "b": 2})).unwrap());
    }

    #[test]
    fn absent_fields_forwards_row_unchanged() {
        let row: Map<String, Value> = serde_json::from_value(json!({"a": 1, "b": 2, "c": 3})).unwrap();
        let out = project(&row, &None);
        assert_eq!(out, row);
    }

    #[test]
    fn empty_fields_forwards_row_unchanged() {
        let row: Map<String, Value> = serde_json::from_value(json!({"a": 1})).unwrap();
        let out = project(&row, &Some(HashMap::new()));
        assert_eq!(out, row);
    }

    #[test]
    fn projection_producing_empty_map_falls_back_to_original_row() {
        let row: Map<String, Value> = serde_json::from_value(json!({"a": 1, "b": 2})).unwrap();
        let f = Some(fields(&[("z", Some("whatever"))]));
        let out = project(&row, &f);
        assert_eq!(out, row);
    }

    #[test]
    fn datetime_normalizes_to_unix_seconds() {
        let v = normalize_value(json!("2021-06-15T12:30:00Z"));
        assert_eq!(v, json!(1623760200));
    }

    #[test]
    fn date_stays_an_iso_string() {
        let v = normalize_value(json!("2021-06-15"));
        assert_eq!(v, json!("2021-06-15"));
    }

    #[test]
    fn non_temporal_values_are_unaffected() {
        assert_eq!(normalize_value(json!(42)), json!(42));
        assert_eq!(normalize_value(json!("plain text")), json!("plain text"));
    }
}
