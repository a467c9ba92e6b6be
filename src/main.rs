//! sensorscan Binary Entry Point
//!
//! Reads decoded sensor measurements from a JSON lines feed and exports them
//! in clock-aligned batches. Core functionality is provided by the
//! `sensorscan` library crate.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sensorscan::{
    Scanner,
    config::{AppConfig, DEFAULT_CONFIG_FILE, parse_duration},
    device::provider_for,
    source::{BroadcastSource, JsonLinesFeed},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// sensorscan - Clock-Aligned BLE Sensor Scanner
#[derive(Parser, Debug)]
#[command(name = "sensorscan", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (default: ./sensorscan.yaml when present)
    #[arg(short, long, env = "SENSORSCAN_CONFIG")]
    config: Option<String>,

    /// Radio adapter to use, or "none" (overrides config file)
    #[arg(long, env = "SENSORSCAN_DEVICE")]
    device: Option<String>,

    /// Scan interval, e.g. "30s" or "1m" (overrides config file)
    #[arg(long, env = "SENSORSCAN_INTERVAL", value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Print measurements to the console
    #[arg(short = 'C', long)]
    console: bool,

    /// JSON lines input, a file path or "-" for stdin (overrides config file)
    #[arg(long, env = "SENSORSCAN_INPUT")]
    input: Option<String>,

    /// Expected peripheral as ADDRESS=LABEL (repeatable)
    #[arg(long = "peripheral", value_name = "ADDRESS=LABEL", value_parser = parse_peripheral)]
    peripherals: Vec<(String, String)>,
}

fn parse_peripheral(s: &str) -> Result<(String, String), String> {
    let (addr, label) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ADDRESS=LABEL, got '{s}'"))?;
    if addr.trim().is_empty() {
        return Err("peripheral address must not be empty".to_string());
    }
    Ok((addr.trim().to_string(), label.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sensorscan=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("sensorscan - Clock-Aligned BLE Sensor Scanner");

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration from file
    let mut config = match cli.config.as_deref() {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            AppConfig::load(path)?
        }
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            tracing::info!("Loading configuration from: {}", DEFAULT_CONFIG_FILE);
            AppConfig::load(DEFAULT_CONFIG_FILE)?
        }
        None => {
            tracing::info!("No configuration file found, using defaults");
            AppConfig::default()
        }
    };

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(device) = cli.device {
        config.scanner.device = device;
    }
    if let Some(interval) = cli.interval {
        config.scanner.interval = interval;
    }
    if let Some(input) = cli.input {
        config.source.input = input;
    }
    config.peripherals.extend(cli.peripherals);
    if cli.console {
        config.sinks.console.get_or_insert_with(Default::default).enabled = true;
    }
    config.validate()?;

    tracing::info!(
        "Device: {}, interval: {}, input: {}",
        config.scanner.device,
        humantime::format_duration(config.scanner.interval),
        config.source.input,
    );

    // Build sinks
    let sinks = config.sinks.build(config.scanner.interval).await?;
    if sinks.is_empty() {
        tracing::warn!("No sinks enabled, measurements will be discarded");
    }

    // Wire the measurement hub, the feed and the scanner
    let registry = Arc::new(config.registry());
    let hub = BroadcastSource::new(Arc::clone(&registry), config.source.hub_capacity);

    let scanner = Scanner::builder()
        .registry(registry)
        .source(Arc::new(hub.clone()))
        .device_provider(provider_for(&config.scanner.device))
        .sinks(sinks)
        .export_timeout(config.scanner.export_timeout)
        .buffer_capacity(config.scanner.buffer_capacity)
        .build()?;

    let shutdown = CancellationToken::new();

    let feed = match JsonLinesFeed::open(&config.source.input, hub).await {
        Ok(feed) => feed,
        Err(e) => {
            scanner.close().await;
            return Err(e.into());
        }
    };
    let feed_task = tokio::spawn(feed.run(shutdown.child_token()));

    let started = match scanner.init(&config.scanner.device).await {
        Ok(()) => scanner.scan(shutdown.clone(), config.scanner.interval),
        Err(e) => Err(e),
    };
    if let Err(e) = started {
        shutdown.cancel();
        scanner.close().await;
        return Err(e.into());
    }

    tracing::info!("Press Ctrl+C to shutdown");
    shutdown_signal().await;

    tracing::info!("Shutting down scanner...");
    shutdown.cancel();
    scanner.close().await;

    match feed_task.await {
        Ok(Ok(stats)) => tracing::info!(
            published = stats.published,
            malformed = stats.malformed,
            "Measurement feed stopped"
        ),
        Ok(Err(e)) => tracing::error!("Measurement feed failed: {}", e),
        Err(e) => tracing::error!("Measurement feed task failed: {}", e),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
