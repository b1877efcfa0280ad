//! Command-line interface definitions for News Sentry.
//!
//! Paths can be given as flags or through environment variables, so the
//! binary can run unattended from cron or a systemd timer.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line arguments for the News Sentry binary.
///
/// # Examples
///
/// ```sh
/// # One scan cycle; alerts go to stdout as JSON lines
/// news_sentry --config sentry.yaml --state state.json scan
///
/// # Section cache ages and block flags from the last cycle
/// NEWS_SENTRY_CONFIG=sentry.yaml news_sentry status
///
/// # Forget every delivered alert
/// news_sentry reset-history
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "NEWS_SENTRY_CONFIG", default_value = "news_sentry.yaml")]
    pub config: PathBuf,

    /// Path to the JSON state file (history and section cache)
    #[arg(short, long, env = "NEWS_SENTRY_STATE", default_value = "news_sentry_state.json")]
    pub state: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run one discovery cycle and print new alerts
    Scan {
        /// Run the cycle but neither print alerts nor record them
        #[arg(long)]
        dry_run: bool,
    },
    /// Print per-source diagnostics as JSON
    Status,
    /// Clear the delivered-alert history
    ResetHistory,
}
