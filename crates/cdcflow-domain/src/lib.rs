//! Domain model shared by every source cursor, the sink writer and the
//! replication engine: the uniform `Event`/`ProgressEvent` record, the
//! tagged `Checkpoint`, and the declared `Sync` mapping from a source table
//! to a target index.

pub mod checkpoint;
pub mod enums;
pub mod error;
pub mod event;
pub mod sync;

pub use checkpoint::Checkpoint;
pub use enums::{EventType, ProgressType, SourceType};
pub use error::DomainError;
pub use event::{Event, ProgressEvent, SourceMessage};
pub use sync::Sync;
