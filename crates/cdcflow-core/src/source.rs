use async_trait::async_trait;
use cdcflow_domain::{Checkpoint, SourceMessage, Sync};
use futures::stream::BoxStream;

use crate::errors::SourceError;

/// The lazy, infinite, non-restartable event stream a cursor produces.
/// Re-invoking `stream()` after it has been consumed may reopen the
/// underlying log at whatever position the checkpoint currently holds —
/// callers never call it twice on the same cursor instance.
pub type EventStream = BoxStream<'static, Result<SourceMessage, SourceError>>;

/// A lazy sequence of row batches, each batch already projected per
/// `Sync::fields`.
pub type RowBatchStream<'a> = BoxStream<'a, Result<Vec<serde_json::Map<String, serde_json::Value>>, SourceError>>;

/// Common contract every source (MySQL binlog, Postgres logical
/// replication, Mongo change stream) implements. Object-safe by design —
/// the registry in `cdcflow-providers` hands callers a `Box<dyn
/// SourceCursor>` selected at runtime by `SourceType`.
///
/// Events for tables not in the declared set are silently dropped by the
/// cursor itself, never by the engine.
#[async_trait]
pub trait SourceCursor: Send + Sync {
    /// Consumes the cursor and returns its event stream. The first element
    /// is always a `SourceMessage::Progress` anchoring the starting
    /// checkpoint, emitted before any mutation event so callers may
    /// persist it first. Every subsequent element carries the checkpoint
    /// *after* the event it's attached to has been produced.
    fn stream(self: Box<Self>) -> EventStream;

    /// Streams the declared table/collection in batches, with field
    /// projection/rename already applied.
    async fn get_full_data<'a>(&'a self, sync: &'a Sync, batch_size: usize) -> Result<RowBatchStream<'a>, SourceError>;

    /// Row/document count for the declared table/collection.
    async fn get_count(&self, sync: &Sync) -> Result<u64, SourceError>;

    /// The source's current ("now") log position, used to anchor a
    /// `refresh` run's post-copy resume point.
    async fn get_current_progress(&self) -> Result<Checkpoint, SourceError>;

    /// Liveness check against the underlying connection(s).
    async fn ping(&self) -> Result<(), SourceError>;
}
