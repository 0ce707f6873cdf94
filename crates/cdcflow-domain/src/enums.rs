use serde::{Deserialize, Serialize};

/// The kind of change a row/document event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

/// Which native change log a `Sync`'s source is read from.
///
/// `MySql` needs an explicit rename: serde's `snake_case` would otherwise
/// render it `my_sql`, not the `mysql` spec.md §6 `source.type` actually
/// uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Mongo,
    #[serde(rename = "mysql")]
    MySql,
    Postgres,
}

/// Which backend the progress checkpoint is durably written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressType {
    File,
    Redis,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_tags_match_config_yaml_spelling() {
        assert_eq!(serde_json::from_str::<SourceType>("\"mysql\"").unwrap(), SourceType::MySql);
        assert_eq!(serde_json::from_str::<SourceType>("\"postgres\"").unwrap(), SourceType::Postgres);
        assert_eq!(serde_json::from_str::<SourceType>("\"mongo\"").unwrap(), SourceType::Mongo);
        assert_eq!(serde_json::to_string(&SourceType::MySql).unwrap(), "\"mysql\"");
    }
}
