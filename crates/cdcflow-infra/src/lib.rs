//! The replication engine: a reader task consuming a source cursor's event
//! stream plus an optional flush task, cooperating over one mutex guarding
//! `(collection, last_checkpoint)` (spec.md §4.5/§5).

pub mod engine;
pub mod error;

pub use engine::{resolve_targets, Engine};
pub use error::InfraError;
