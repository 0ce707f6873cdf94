//! `cdcflow` binary's library surface: CLI argument shapes, command
//! implementations, and the process-level logging/Sentry setup shared by
//! `src/main.rs`. Kept separate from `main.rs` so the command
//! implementations are unit-testable without spawning a process.

pub mod cli;
pub mod commands;
pub mod errors;
pub mod logging;

pub use cli::{Cli, Command};
pub use errors::CliError;
