use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::enums::SourceType;
use crate::error::DomainError;

/// Opaque, per-source log position. The replication engine never compares
/// checkpoints across source kinds — that is a logic error and panics in
/// debug builds via `Checkpoint::assert_same_kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Checkpoint {
    MySql { master_log_file: String, master_log_position: u64 },
    Postgres { start_lsn: String },
    Mongo { resume_token: serde_json::Value },
}

impl Checkpoint {
    pub fn source_type(&self) -> SourceType {
        match self {
            Checkpoint::MySql { .. } => SourceType::MySql,
            Checkpoint::Postgres { .. } => SourceType::Postgres,
            Checkpoint::Mongo { .. } => SourceType::Mongo,
        }
    }

    /// Flattens this checkpoint into the `String -> String` wire form the
    /// progress store persists verbatim.
    pub fn as_kv(&self) -> HashMap<String, String> {
        let mut m = HashMap::new();
        match self {
            Checkpoint::MySql { master_log_file, master_log_position } => {
                m.insert("master_log_file".to_string(), master_log_file.clone());
                m.insert("master_log_position".to_string(), master_log_position.to_string());
            }
            Checkpoint::Postgres { start_lsn } => {
                m.insert("start_lsn".to_string(), start_lsn.clone());
            }
            Checkpoint::Mongo { resume_token } => {
                // canonical serialization: compact JSON text
                m.insert("resume_token".to_string(), resume_token.to_string());
            }
        }
        m
    }

    /// Rebuilds a checkpoint of the given source kind from its flat wire
    /// form. Returns `Ok(None)` semantics are handled by the caller (the
    /// progress store returns `None` when uninitialized, never an empty map
    /// routed through here).
    pub fn from_kv(kind: SourceType, kv: &HashMap<String, String>) -> Result<Self, DomainError> {
        match kind {
            SourceType::MySql => {
                let file = kv.get("master_log_file").ok_or(DomainError::MissingCheckpointField("master_log_file"))?;
                let pos = kv.get("master_log_position").ok_or(DomainError::MissingCheckpointField("master_log_position"))?;
                let pos: u64 = pos.parse().map_err(|e: std::num::ParseIntError| DomainError::InvalidCheckpointValue {
                    field: "master_log_position",
                    reason: e.to_string(),
                })?;
                Ok(Checkpoint::MySql { master_log_file: file.clone(), master_log_position: pos })
            }
            SourceType::Postgres => {
                let lsn = kv.get("start_lsn").ok_or(DomainError::MissingCheckpointField("start_lsn"))?;
                Ok(Checkpoint::Postgres { start_lsn: lsn.clone() })
            }
            SourceType::Mongo => {
                let raw = kv.get("resume_token").ok_or(DomainError::MissingCheckpointField("resume_token"))?;
                let resume_token: serde_json::Value = serde_json::from_str(raw).map_err(|e| DomainError::InvalidCheckpointValue {
                    field: "resume_token",
                    reason: e.to_string(),
                })?;
                Ok(Checkpoint::Mongo { resume_token })
            }
        }
    }

    /// Panics (debug) / logs (release, via `tracing::error!`) if `other` is
    /// not the same source kind as `self`. The engine only ever compares
    /// checkpoints it produced itself against themselves, so this should
    /// never trip in practice; it exists to catch a wiring bug loudly.
    pub fn assert_same_kind(&self, other: &Checkpoint) {
        debug_assert_eq!(
            std::mem::discriminant(self),
            std::mem::discriminant(other),
            "compared checkpoints of different source kinds: {:?} vs {:?}",
            self,
            other
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mysql_round_trips_through_kv() {
        let cp = Checkpoint::MySql { master_log_file: "binlog.000003".into(), master_log_position: 4512 };
        let kv = cp.as_kv();
        let back = Checkpoint::from_kv(SourceType::MySql, &kv).unwrap();
        assert_eq!(cp, back);
    }

    #[test]
    fn postgres_round_trips_through_kv() {
        let cp = Checkpoint::Postgres { start_lsn: "0/16B3748".into() };
        let kv = cp.as_kv();
        let back = Checkpoint::from_kv(SourceType::Postgres, &kv).unwrap();
        assert_eq!(cp, back);
    }

    #[test]
    fn mongo_round_trips_through_kv() {
        let cp = Checkpoint::Mongo { resume_token: serde_json::json!({"_data": "82653..."}) };
        let kv = cp.as_kv();
        let back = Checkpoint::from_kv(SourceType::Mongo, &kv).unwrap();
        assert_eq!(cp, back);
    }

    #[test]
    fn missing_field_is_reported() {
        let kv = HashMap::new();
        let err = Checkpoint::from_kv(SourceType::MySql, &kv).unwrap_err();
        assert!(matches!(err, DomainError::MissingCheckpointField("master_log_file")));
    }
}
