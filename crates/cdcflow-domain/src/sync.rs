use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A declared, immutable-for-the-run mapping from one source table to one
/// target MeiliSearch index.
///
/// Equality and map-keying use `table` alone: a run never declares the same
/// source table twice (`cdcflow-providers::config` rejects that at load
/// time), so `table` is a sufficient, stable identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sync {
    pub table: String,
    #[serde(default = "default_pk")]
    pub pk: String,
    #[serde(default)]
    pub full: bool,
    pub index: Option<String>,
    /// `src_column -> dst_name | null`. `null` keeps the original name but
    /// still counts as "configured" (so the column survives projection
    /// rather than being dropped).
    pub fields: Option<HashMap<String, Option<String>>>,
    #[serde(default)]
    pub plugins: Vec<String>,
}

fn default_pk() -> String {
    "id".to_string()
}

impl Sync {
    /// The index this sync writes to: `index` if set, else `table`.
    pub fn index_name(&self) -> &str {
        self.index.as_deref().unwrap_or(&self.table)
    }
}

impl PartialEq for Sync {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table
    }
}

impl Eq for Sync {}

impl Hash for Sync {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.table.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_name_defaults_to_table() {
        let s = Sync { table: "orders".into(), pk: "id".into(), full: false, index: None, fields: None, plugins: vec![] };
        assert_eq!(s.index_name(), "orders");
    }

    #[test]
    fn index_name_uses_configured_value() {
        let s = Sync { table: "orders".into(), pk: "id".into(), full: false, index: Some("orders_v2".into()), fields: None, plugins: vec![] };
        assert_eq!(s.index_name(), "orders_v2");
    }

    #[test]
    fn equality_is_by_table_only() {
        let a = Sync { table: "orders".into(), pk: "id".into(), full: false, index: None, fields: None, plugins: vec![] };
        let b = Sync { table: "orders".into(), pk: "order_id".into(), full: true, index: Some("x".into()), fields: None, plugins: vec![] };
        assert_eq!(a, b);
    }
}
