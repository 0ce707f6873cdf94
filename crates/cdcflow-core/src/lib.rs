//! Shared engine-facing contracts: the `SourceCursor` trait every
//! MySQL/Postgres/Mongo adapter implements, the per-sync coalescing
//! `EventCollection`, the `Plugin` chain, and the error types the
//! replication engine reasons about.

pub mod collection;
pub mod errors;
pub mod plugin;
pub mod source;

pub use collection::EventCollection;
pub use errors::{CoreError, SourceError};
pub use plugin::{Plugin, PluginChain};
pub use source::{EventStream, RowBatchStream, SourceCursor};
