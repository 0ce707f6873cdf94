//! The Progress Store: durable read/write of the opaque checkpoint for the
//! active source. Two backends — a JSON file and a Redis hash — share the
//! same `total replace` write contract (spec.md §4.2).

pub mod error;
pub mod file;
pub mod redis_store;

pub use error::PersistenceError;
pub use file::FileProgressStore;
pub use redis_store::RedisProgressStore;

use async_trait::async_trait;
use cdcflow_domain::{Checkpoint, SourceType};

/// Durable checkpoint storage. `set` is total-replace: the caller always
/// writes the full checkpoint mapping, never a partial update. `get`
/// returns `Ok(None)` when uninitialized — the engine treats that as
/// "start from current log head".
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn get(&self, source_kind: SourceType) -> Result<Option<Checkpoint>, PersistenceError>;
    async fn set(&self, checkpoint: &Checkpoint) -> Result<(), PersistenceError>;
}
