//! KeepDB CLI
//!
//! Command-line tools for KeepDB stores.
//!
//! # Commands
//!
//! - `inspect` - Display store metadata, tables and sizes
//! - `schema-version` - Print the persisted schema version
//! - `dump-wal` - Dump WAL records for debugging
//! - `compact` - Checkpoint and compact segments to reclaim space

mod commands;
mod error;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::commands::{OutputFormat, StoreArgs};
use crate::error::CliResult;

/// KeepDB command-line store tools.
#[derive(Parser)]
#[command(name = "keepdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Encryption key of the store, hex encoded
    #[arg(global = true, long, value_name = "HEX")]
    key_hex: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store metadata, tables and sizes
    Inspect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Print the persisted schema version, or -1 if there is no store
    SchemaVersion,

    /// Dump WAL records for debugging
    DumpWal {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Checkpoint the store and compact its segments
    Compact,

    /// Show version information
    Version,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    if let Commands::Version = cli.command {
        println!("KeepDB CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("KeepDB Core v{}", keepdb_core::VERSION);
        return Ok(());
    }

    let store = StoreArgs::new(cli.path, cli.key_hex.as_deref())?;
    match cli.command {
        Commands::Inspect { format } => commands::inspect::run(&store, format),
        Commands::SchemaVersion => commands::schema_version::run(&store),
        Commands::DumpWal { limit, format } => commands::dump_wal::run(&store, limit, format),
        Commands::Compact => commands::compact::run(&store),
        Commands::Version => Ok(()),
    }
}
