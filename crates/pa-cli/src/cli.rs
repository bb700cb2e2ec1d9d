//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Background usage tracker.
///
/// Runs activity collectors, asks periodic self-report questions and
/// reconstructs usage sessions from the recorded lifecycle events.
#[derive(Debug, Parser)]
#[command(name = "pa", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the trackers until interrupted.
    ///
    /// SIGINT quits. SIGTERM records a shutdown, then quits. SIGUSR1 and
    /// SIGUSR2 report a screen lock and unlock.
    Run,

    /// Answer or skip the most recent self-report prompt.
    Answer {
        /// Your answer on the prompt's scale (1 = lowest).
        #[arg(required_unless_present = "skip")]
        response: Option<u8>,

        /// Dismiss the prompt without answering.
        #[arg(long, conflicts_with = "response")]
        skip: bool,
    },

    /// List the most recent sessions.
    Sessions {
        /// Maximum number of sessions to show.
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Dump usage events as JSONL.
    Events {
        /// Only events at or after this time (ISO 8601 or e.g. "2 hours ago").
        #[arg(long)]
        after: Option<String>,

        /// Only events before this time (ISO 8601 or e.g. "2 hours ago").
        #[arg(long)]
        before: Option<String>,
    },

    /// Show database and tracking status.
    Status,
}
