//! # shopsync
//!
//! Operator CLI for a store's LocalStore and its sync with central.
//!
//! ## Commands
//!
//! - `sync`: Run a sync cycle now
//! - `auto`: Run a cycle only if one is due (threshold or interval)
//! - `stats`: Show sync status, optionally as JSON
//! - `test-connection`: Probe the central database
//! - `logs`: Show the tail of the sync log
//! - `clear-queue`: Discard every queued change (needs `--yes`)
//! - `dead-letters`: List, retry or discard dead-lettered changes
//! - `watch`: Run the auto-sync scheduler until Ctrl-C
//!
//! ## Example
//!
//! ```bash
//! # Sync now against the configured central database
//! shopsync sync
//!
//! # Same, against an in-memory central (demo / smoke test)
//! shopsync --mock sync
//!
//! # Status for a dashboard
//! shopsync stats --json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use shopsync_sync::{NoOpEmitter, SyncEventEmitter};

mod commands;
mod engine;

use commands::{auto, clear_queue, dead_letters, logs, stats, sync, test_connection, watch};

/// Operator CLI for the shopsync store database.
#[derive(Parser, Debug)]
#[command(name = "shopsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-memory central database instead of PostgreSQL (for testing/demo)
    #[arg(long, global = true)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a sync cycle now
    Sync,

    /// Run a sync cycle if the queue threshold or interval says so
    Auto,

    /// Show sync status
    Stats {
        /// Print the status snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that the central database is reachable
    TestConnection,

    /// Show recent sync log lines
    Logs {
        /// Number of lines
        #[arg(long, short = 'n', default_value = "50")]
        lines: usize,
    },

    /// Discard every queued change, including dead letters
    ClearQueue {
        /// Confirm the queue should be discarded
        #[arg(long)]
        yes: bool,
    },

    /// Manage changes that central kept rejecting
    DeadLetters {
        #[command(subcommand)]
        action: DeadLetterAction,
    },

    /// Run automatic sync in the foreground until interrupted
    Watch {
        /// Seconds between trigger checks
        #[arg(long, default_value = "15")]
        check_secs: u64,
    },
}

#[derive(Subcommand, Debug)]
enum DeadLetterAction {
    /// List dead-lettered changes
    List {
        /// Maximum number of entries
        #[arg(long, default_value = "100")]
        limit: u32,
    },

    /// Put every dead-lettered change back in the queue
    Retry,

    /// Drop one dead-lettered change for good
    Discard {
        /// Queue sequence number
        seq: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let emitter: Arc<dyn SyncEventEmitter> = match cli.command {
        Commands::Watch { .. } => Arc::new(watch::ConsoleEmitter),
        _ => Arc::new(NoOpEmitter),
    };
    let manager = engine::open(cli.config, cli.mock, emitter).await?;

    match cli.command {
        Commands::Sync => sync::run(&manager).await?,
        Commands::Auto => auto::run(&manager).await?,
        Commands::Stats { json } => stats::run(&manager, json).await?,
        Commands::TestConnection => test_connection::run(&manager).await?,
        Commands::Logs { lines } => logs::run(&manager, lines).await?,
        Commands::ClearQueue { yes } => clear_queue::run(&manager, yes).await?,
        Commands::DeadLetters { action } => match action {
            DeadLetterAction::List { limit } => dead_letters::list(&manager, limit).await?,
            DeadLetterAction::Retry => dead_letters::retry(&manager).await?,
            DeadLetterAction::Discard { seq } => dead_letters::discard(&manager, seq).await?,
        },
        Commands::Watch { check_secs } => watch::run(manager, check_secs).await?,
    }

    Ok(())
}

/// Tracing goes to stderr so `stats --json` stays machine-readable.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=shopsync_sync=trace` - Trace the sync engine only
/// - Default: warnings, plus info from the shopsync crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,shopsync_sync=info,shopsync_db=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_dead_letter_discard() {
        let cli = Cli::try_parse_from(["shopsync", "--mock", "dead-letters", "discard", "42"]).unwrap();
        assert!(cli.mock);
        assert!(matches!(
            cli.command,
            Commands::DeadLetters {
                action: DeadLetterAction::Discard { seq: 42 }
            }
        ));
    }

    #[test]
    fn parses_logs_line_count() {
        let cli = Cli::try_parse_from(["shopsync", "logs", "-n", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::Logs { lines: 5 }));
    }
}
