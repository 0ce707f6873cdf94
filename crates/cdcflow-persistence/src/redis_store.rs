use cdcflow_domain::{Checkpoint, SourceType};
use redis::AsyncCommands;

use crate::error::PersistenceError;
use crate::ProgressStore;

/// Redis-hash-backed progress store. `set` is total-replace: the hash is
/// cleared and rewritten inside a single pipeline so a reader never
/// observes a mix of an old and a new checkpoint's fields (spec.md §4.2).
pub struct RedisProgressStore {
    client: redis::Client,
    key: String,
}

impl RedisProgressStore {
    pub fn new(dsn: &str, key: impl Into<String>) -> Result<Self, PersistenceError> {
        let client = redis::Client::open(dsn).map_err(|e| PersistenceError::RedisConnection(e.to_string()))?;
        Ok(Self { client, key: key.into() })
    }

    pub fn default_dsn() -> &'static str {
        "redis://localhost:6379/0"
    }

    pub fn default_key() -> &'static str {
        "meilisync:progress"
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, PersistenceError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| PersistenceError::RedisConnection(e.to_string()))
    }
}

#[async_trait::async_trait]
impl ProgressStore for RedisProgressStore {
    async fn get(&self, source_kind: SourceType) -> Result<Option<Checkpoint>, PersistenceError> {
        let mut conn = self.connection().await?;
        let kv: std::collections::HashMap<String, String> = conn
            .hgetall(&self.key)
            .await
            .map_err(|e| PersistenceError::RedisCommand(e.to_string()))?;
        if kv.is_empty() {
            return Ok(None);
        }
        Ok(Some(Checkpoint::from_kv(source_kind, &kv)?))
    }

    async fn set(&self, checkpoint: &Checkpoint) -> Result<(), PersistenceError> {
        let kv = checkpoint.as_kv();
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic().del(&self.key);
        if !kv.is_empty() {
            pipe.hset_multiple(&self.key, &kv.into_iter().collect::<Vec<_>>());
        }
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| PersistenceError::RedisCommand(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dsn_and_key_match_spec() {
        assert_eq!(RedisProgressStore::default_dsn(), "redis://localhost:6379/0");
        assert_eq!(RedisProgressStore::default_key(), "meilisync:progress");
    }

    #[test]
    fn construction_rejects_unparseable_dsn() {
        let err = RedisProgressStore::new("not-a-url", "k").unwrap_err();
        assert!(matches!(err, PersistenceError::RedisConnection(_)));
    }
}
