//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::protocol::Framing;

/// Tab time tracking and focus mode host.
///
/// Runs as the browser extension's native messaging host and inspects the
/// usage data it records.
#[derive(Debug, Parser)]
#[command(name = "tabguard", version, about, long_about = None)]
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
    /// Serve browser events on stdin/stdout until the input closes.
    Run {
        /// Wire framing of stdin and stdout.
        #[arg(long, value_enum, default_value_t = Framing::Native)]
        framing: Framing,
    },

    /// Show recorded time per tab.
    Report {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete all recorded usage.
    Clear,
}
