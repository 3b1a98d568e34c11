//! Persisting CLI
//!
//! Command-line tools for persisting partition directories.
//!
//! # Commands
//!
//! - `inspect` - Display WAL and sink state without modifying anything
//! - `verify` - Check every WAL frame and sink batch
//! - `dump-wal` - Print the records recovery would replay
//! - `flush` - Recover, flush the buffer into the sink and close

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Persisting partition tools.
#[derive(Parser)]
#[command(name = "persisting")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the partition directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display WAL and sink state
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify WAL frames and sink batches; fails on any damage
    Verify,

    /// Dump the records recovery would replay, one JSON object per line
    DumpWal {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Skip this many records first
        #[arg(short, long, default_value = "0")]
        offset: usize,
    },

    /// Recover the partition, flush its buffer into the sink and close it
    Flush {
        /// Bucket id recorded in logs
        #[arg(short, long, default_value = "cli")]
        bucket: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Partition path required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Verify => {
            let path = cli.path.ok_or("Partition path required for verify")?;
            commands::verify::run(&path)?;
        }
        Commands::DumpWal { limit, offset } => {
            let path = cli.path.ok_or("Partition path required for dump-wal")?;
            commands::dump_wal::run(&path, offset, limit)?;
        }
        Commands::Flush { bucket } => {
            let path = cli.path.ok_or("Partition path required for flush")?;
            commands::flush::run(&path, &bucket)?;
        }
        Commands::Version => {
            println!("Persisting CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Persisting Core v{}", persisting_core::VERSION);
        }
    }

    Ok(())
}
