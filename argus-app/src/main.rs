mod alert_log;

use anyhow::Result;
use argus_stream::{analytics, StreamConfig, StreamSession};
use clap::Parser;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "argus", version, about = "Argus Intel — real-time intelligence operations console")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "argus.toml")]
    config: String,

    /// Push channel endpoint (overrides config file)
    #[arg(long)]
    endpoint: Option<String>,

    /// Snapshot endpoint (overrides config file)
    #[arg(long)]
    snapshot_endpoint: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Generate a default config file and exit
    #[arg(long)]
    generate_config: bool,

    /// Dry-run: load config, validate, exit
    #[arg(long)]
    dry_run: bool,

    /// Disable the push channel and poll the snapshot endpoint instead
    #[arg(long)]
    poll_only: bool,

    /// Investigation targets to subscribe to on connect (repeatable)
    #[arg(long)]
    subscribe: Vec<String>,

    /// Alert log file path (JSONL); empty disables
    #[arg(long, default_value = "argus-alerts.jsonl")]
    alert_log: String,

    /// Webhook URL for alert delivery (empty = disabled)
    #[arg(long, default_value = "")]
    alert_webhook: String,

    /// Seconds between status summary lines (0 disables)
    #[arg(long, default_value_t = 15)]
    status_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Generate Config ──────────────────────────────────────────────
    if cli.generate_config {
        let config = StreamConfig::default();
        config.save(&cli.config)?;
        println!("Default configuration written to {}", cli.config);
        return Ok(());
    }

    // ── Tracing ──────────────────────────────────────────────────────
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // ── Load Config ──────────────────────────────────────────────────
    let mut config = StreamConfig::load(&cli.config).unwrap_or_else(|e| {
        warn!(error = %e, "using default configuration");
        StreamConfig::default()
    });
    if let Some(endpoint) = cli.endpoint {
        config.push_endpoint = endpoint;
    }
    if let Some(snapshot) = cli.snapshot_endpoint {
        config.snapshot_endpoint = snapshot;
    }
    if cli.poll_only {
        config.push_enabled = false;
    }
    config.validate()?;

    info!("Argus Intel v{}", env!("CARGO_PKG_VERSION"));
    info!(
        push = config.push_enabled,
        endpoint = %config.push_endpoint,
        snapshot = %config.snapshot_endpoint,
        poll_ms = config.poll_interval_ms,
        "Stream configuration"
    );

    if cli.dry_run {
        info!("Dry-run complete. Configuration valid.");
        return Ok(());
    }

    // ── Stream Session ───────────────────────────────────────────────
    let handle = StreamSession::new(config).start();
    for target in &cli.subscribe {
        handle.subscribe(target.clone());
        info!(target = %target, "Subscription requested");
    }

    // ── Alert Dispatcher ─────────────────────────────────────────────
    let dispatch = alert_log::AlertDispatcher::new(handle.reader())
        .with_log_file(&cli.alert_log)
        .with_webhook(&cli.alert_webhook)
        .with_interval(5)
        .start();
    info!(log = %cli.alert_log, "Alert dispatcher started");

    // ── Status Ticker ────────────────────────────────────────────────
    if cli.status_interval_secs > 0 {
        let reader = handle.reader();
        let interval_secs = cli.status_interval_secs;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                let snap = reader.snapshot();
                let trend = analytics::trend_of(&snap.metrics, |p| p.threats_detected as f64);
                info!(
                    connected = snap.connected,
                    mode = ?snap.mode,
                    points = snap.metrics.len(),
                    alerts = snap.alerts.len(),
                    entities = snap.entities.len(),
                    anomaly = format!("{:.2}", snap.aggregate_anomaly),
                    threat_trend = ?trend.map(|t| t.direction),
                    "Status"
                );
            }
        });
    }

    info!("Argus console running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down Argus...");

    // ── Graceful Shutdown ────────────────────────────────────────────
    dispatch.stop();
    let report = handle.report();
    handle.shutdown().await;

    info!(
        frames = report.frames_received,
        alerts = report.alerts_recorded,
        polls = report.polls_issued,
        reconnects = report.reconnects_scheduled,
        malformed = report.malformed_dropped,
        "Shutdown complete"
    );

    Ok(())
}
