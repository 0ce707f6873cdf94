//! Command-line surface (spec.md §6): `start`, `refresh`, `check`,
//! `version`, plus the global `-c/--config` flag.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "cdcflow",
    author,
    version,
    about = "Tails a source database's change log and mirrors it into MeiliSearch",
    long_about = None
)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short = 'c', long = "config", global = true, default_value = "config.yml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the replication engine until killed
    Start,

    /// Full refresh of one or more synced tables via an atomic index swap
    Refresh {
        /// Table to refresh (repeatable); defaults to every declared sync
        #[arg(short = 't', long = "table")]
        table: Vec<String>,

        /// Row batch size used while streaming the full copy
        #[arg(short = 's', long = "size", default_value_t = 10_000)]
        size: usize,

        /// Write directly into the live index instead of swapping a temp one
        #[arg(short = 'd', long = "keep-index")]
        keep_index: bool,
    },

    /// Compare source row counts against MeiliSearch document counts
    Check {
        /// Table to check (repeatable); defaults to every declared sync
        #[arg(short = 't', long = "table")]
        table: Vec<String>,
    },

    /// Print the build version
    Version,
}
