//! # News Sentry
//!
//! Command-line front end for the discovery engine. It plays the host
//! application's part: it loads configuration and state, runs a cycle,
//! "delivers" alerts by printing them as JSON lines on stdout, and records
//! what was delivered.
//!
//! ## Usage
//!
//! ```sh
//! news_sentry --config sentry.yaml --state state.json scan
//! ```
//!
//! Logs go to stderr (`RUST_LOG` controls the level), so stdout stays a
//! clean alert stream.

use std::error::Error;

use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use tracing::{info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use news_sentry::config::EngineConfig;
use news_sentry::engine::{CycleStats, Engine, SourceDiagnostics};
use news_sentry::fetch::HttpFetcher;
use news_sentry::notify::{JsonLinesNotifier, deliver_alerts};
use news_sentry::store::{State, load_state, save_state};

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    info!(config = %args.config.display(), state = %args.state.display(), command = ?args.command, "news_sentry starting up");

    match args.command {
        Command::Scan { dry_run } => scan(&args, dry_run).await,
        Command::Status => status(&args).await,
        Command::ResetHistory => reset_history(&args).await,
    }
}

/// Load config and state, and bring History in line with the configured
/// capacity and retention.
async fn prepare(args: &Cli) -> Result<(EngineConfig, State), Box<dyn Error>> {
    let config = EngineConfig::load(&args.config).await?;
    let mut state = load_state(&args.state).await?;

    let evicted = state.history.set_capacity(config.history_capacity);
    let pruned = state.history.prune_older_than(Utc::now() - config.history_retention());
    info!(
        history = state.history.len(),
        evicted = evicted.len(),
        pruned,
        cached_sections = state.sections.len(),
        "Loaded state"
    );
    Ok((config, state))
}

fn build_engine(config: EngineConfig, state: &mut State) -> Result<Engine<HttpFetcher>, Box<dyn Error>> {
    let fetcher = HttpFetcher::new(config.request_timeout(), &config.user_agent)?;
    let mut engine = Engine::new(config, fetcher)?;
    engine.restore(std::mem::take(&mut state.sections), state.last_stats.take());
    Ok(engine)
}

#[instrument(level = "info", skip_all, fields(dry_run = dry_run))]
async fn scan(args: &Cli, dry_run: bool) -> Result<(), Box<dyn Error>> {
    let start_time = std::time::Instant::now();
    let (config, mut state) = prepare(args).await?;
    let mut engine = build_engine(config, &mut state)?;

    let report = tokio::select! {
        report = engine.run_cycle(&state.history, Utc::now()) => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; abandoning the cycle without saving state");
            return Ok(());
        }
    };

    if dry_run {
        info!(alerts = report.alerts.len(), "Dry run; nothing printed or recorded");
        return Ok(());
    }

    let notifier = JsonLinesNotifier::new(std::io::stdout());
    let delivery = deliver_alerts(&report.alerts, &notifier, &mut state.history, Utc::now()).await;

    state.sections = engine.section_cache().clone();
    state.last_stats = engine.last_stats().cloned();
    state.saved_at = Some(Utc::now());
    save_state(&args.state, &state).await?;

    let elapsed = start_time.elapsed();
    info!(
        alerts = report.alerts.len(),
        delivered = delivery.delivered,
        failed = delivery.failed,
        history = state.history.len(),
        elapsed_secs = elapsed.as_secs_f64(),
        "Scan complete"
    );
    Ok(())
}

#[derive(Serialize)]
struct StatusReport<'a> {
    history_entries: usize,
    history_capacity: usize,
    saved_at: Option<chrono::DateTime<Utc>>,
    sources: Vec<SourceDiagnostics>,
    last_cycle: Option<&'a CycleStats>,
}

async fn status(args: &Cli) -> Result<(), Box<dyn Error>> {
    let (config, mut state) = prepare(args).await?;
    let engine = build_engine(config, &mut state)?;

    let report = StatusReport {
        history_entries: state.history.len(),
        history_capacity: state.history.capacity(),
        saved_at: state.saved_at,
        sources: engine.diagnostics(Utc::now()),
        last_cycle: engine.last_stats(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn reset_history(args: &Cli) -> Result<(), Box<dyn Error>> {
    let mut state = load_state(&args.state).await?;
    let removed = state.history.clear();
    state.saved_at = Some(Utc::now());
    save_state(&args.state, &state).await?;
    info!(removed, "History cleared");
    Ok(())
}
