//! Logging arguments.

use clap::{ArgAction, Parser};

/// Logging arguments.
#[derive(Parser, Clone, Debug, Default, PartialEq, Eq)]
pub struct LogArgs {
    /// Verbosity level (0-4), raised by repeating `-v`.
    #[arg(long = "verbosity", short = 'v', action = ArgAction::Count, global = true)]
    pub verbosity: u8,
    /// Write logs as JSON lines.
    #[arg(long = "log.json", env = "LOG_JSON", global = true)]
    pub json: bool,
}
