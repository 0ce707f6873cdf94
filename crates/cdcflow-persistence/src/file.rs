use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cdcflow_domain::{Checkpoint, SourceType};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::PersistenceError;
use crate::ProgressStore;

/// JSON-file-backed progress store. Writes are atomic: the new content is
/// written to a sibling temp file and renamed into place, so a crash mid-
/// write never leaves a half-written `progress.json` behind.
pub struct FileProgressStore {
    path: PathBuf,
}

impl FileProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("progress.json")
    }
}

#[async_trait]
impl ProgressStore for FileProgressStore {
    async fn get(&self, source_kind: SourceType) -> Result<Option<Checkpoint>, PersistenceError> {
        match fs::read(&self.path).await {
            Ok(bytes) => {
                let kv: HashMap<String, String> = serde_json::from_slice(&bytes)?;
                if kv.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Checkpoint::from_kv(source_kind, &kv)?))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, checkpoint: &Checkpoint) -> Result<(), PersistenceError> {
        let kv = checkpoint.as_kv();
        let body = serde_json::to_vec_pretty(&kv)?;
        write_atomic(&self.path, &body).await?;
        Ok(())
    }
}

async fn write_atomic(path: &Path, body: &[u8]) -> Result<(), std::io::Error> {
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut tmp = fs::File::create(&tmp_path).await?;
        tmp.write_all(body).await?;
        tmp.flush().await?;
    }
    fs::rename(&tmp_path, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdcflow_domain::Checkpoint as Cp;

    #[tokio::test]
    async fn get_returns_none_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path().join("progress.json"));
        assert!(store.get(SourceType::MySql).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path().join("progress.json"));
        let cp = Cp::MySql { master_log_file: "binlog.000001".into(), master_log_position: 99 };
        store.set(&cp).await.unwrap();
        let back = store.get(SourceType::MySql).await.unwrap().unwrap();
        assert_eq!(cp, back);
    }

    #[tokio::test]
    async fn set_is_total_replace() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path().join("progress.json"));
        store.set(&Cp::Postgres { start_lsn: "0/1".into() }).await.unwrap();
        store.set(&Cp::Postgres { start_lsn: "0/2".into() }).await.unwrap();
        let back = store.get(SourceType::Postgres).await.unwrap().unwrap();
        assert_eq!(back, Cp::Postgres { start_lsn: "0/2".into() });
    }
}
