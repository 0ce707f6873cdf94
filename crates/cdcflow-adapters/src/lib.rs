//! Concrete source cursors (MySQL binlog, Postgres logical replication,
//! MongoDB change streams) and the MeiliSearch sink writer.
//!
//! Each source module owns a plain options struct rather than accepting
//! `cdcflow-providers`' `Config` types directly — `cdcflow-providers`
//! depends on this crate, not the other way around, so translating at the
//! boundary is what keeps the workspace's dependency graph acyclic.

pub mod meili;
pub mod mongo;
pub mod mysql;
pub mod postgres;

pub use meili::{SinkError, SinkWriter, SyncTarget};
pub use mongo::MongoCursor;
pub use mysql::MySqlCursor;
pub use postgres::PostgresCursor;
