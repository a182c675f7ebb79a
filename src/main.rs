mod config;
mod data;
mod diagnostics;
mod dispatch;
mod error;
mod filter;
mod indicators;
mod regime;
mod scanner;
mod strategies;
mod tracker;
mod types;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::data::DataSource;
use crate::diagnostics::DiagnosticRecorder;
use crate::dispatch::{Dispatcher, EventLogSink, LogSink, ScanReportWriter, Sink};
use crate::scanner::Scanner;

#[derive(Parser)]
#[command(name = "market-scanner")]
#[command(about = "Multi-asset technical-analysis signal scanner", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scanner loop until interrupted
    Run {
        /// Append-only JSON event stream
        #[arg(long, default_value = "events.jsonl")]
        event_log: PathBuf,

        /// Append-only per-tick scan report
        #[arg(long, default_value = "scan_report.csv")]
        scan_report: PathBuf,
    },
    /// Validate the configuration and exit
    CheckConfig,
    /// Fetch, enrich and classify once, then print the market condition
    Analyze,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let settings = config::load_settings(&cli.config)?;
    for key in settings.unknown_keys() {
        warn!("ignoring unknown configuration key '{key}'");
    }
    let resolved = settings.resolve()?;

    match cli.command {
        Commands::CheckConfig => {
            info!(
                "configuration OK: {} on {:?}, {} strategies enabled",
                resolved.symbol,
                resolved.timeframes,
                resolved.enabled_strategies.len()
            );
            Ok(())
        }
        Commands::Analyze => analyze(resolved).await,
        Commands::Run { event_log, scan_report } => run(resolved, event_log, scan_report).await,
    }
}

async fn run(
    resolved: config::ResolvedConfig,
    event_log: PathBuf,
    scan_report: PathBuf,
) -> Result<()> {
    info!("market scanner starting for {}", resolved.symbol);

    let sinks: Vec<Box<dyn Sink>> = vec![
        Box::new(LogSink),
        Box::new(EventLogSink::create(&event_log)?),
    ];
    let (dispatcher, worker) = Dispatcher::channel(256, sinks);
    let report = ScanReportWriter::create(&scan_report)?;

    let source = DataSource::from_names(&resolved.providers)
        .with_call_timeout(Duration::from_secs(resolved.provider_timeout_s));
    let diagnostics = Arc::new(DiagnosticRecorder::new(Utc::now()));
    let scanner = Scanner::new(resolved, source, dispatcher, diagnostics, Some(report));

    let cancel = CancellationToken::new();
    let worker_handle = tokio::spawn(worker.run(cancel.child_token()));
    let scanner_handle = tokio::spawn(scanner.run(cancel.child_token()));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested; finishing in-flight tick");
    cancel.cancel();

    scanner_handle.await??;
    worker_handle.await?;
    info!("scanner stopped cleanly");
    Ok(())
}

/// One-shot pipeline pass for operators poking at a market by hand.
async fn analyze(resolved: config::ResolvedConfig) -> Result<()> {
    let source = DataSource::from_names(&resolved.providers)
        .with_call_timeout(Duration::from_secs(resolved.provider_timeout_s));
    source.connect(&resolved.symbol).await?;

    for timeframe in &resolved.timeframes {
        let (buffer, is_fresh) = source
            .fetch(&resolved.symbol, *timeframe, resolved.candle_history, Utc::now())
            .await?;
        let enriched = indicators::enrich(&buffer, &resolved.indicators, *timeframe, is_fresh)?;
        let condition = regime::classify(&enriched);
        let last = enriched.last();
        info!(
            "{} {}: close {} | RSI {:.1} ADX {:.1} ATR {:.4} VWAP {:.4} | trend {:?} volatility {:?} ranging {} (fresh: {})",
            resolved.symbol,
            timeframe,
            last.candle.close,
            last.rsi,
            last.adx,
            last.atr,
            last.vwap,
            condition.trend_strength,
            condition.volatility,
            condition.is_ranging,
            is_fresh,
        );
    }
    source.close();
    Ok(())
}
