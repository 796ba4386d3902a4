//! ZoneWatch - Hosted Zone Change Monitor
//!
//! Relays or polls hosted zone changes and publishes them as alerts.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use zonewatch::{
    app::App,
    cli::{Cli, Command},
    config::{Config, Mode},
    internal_metrics::{describe_metrics, LoggingRecorder},
    lambda, logging,
    relay::RelayOutcome,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command.clone() else {
        Cli::command().print_help()?;
        return Ok(());
    };

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            logging::init("error", Default::default());
            error!("Failed to load configuration: {:#}", err);
            std::process::exit(1);
        }
    };

    logging::init(&config.log_level, config.log_format);
    info!("ZoneWatch starting up...");

    let mode = match &command {
        Command::Relay { .. } => Mode::Push,
        Command::Poll { .. } => Mode::Poll,
        Command::Lambda { mode } => *mode,
    };
    config.validate(mode)?;

    info!("-------------------- Configuration --------------------");
    info!("Mode: {:?}", mode);
    info!("Origin Label: {}", config.origin_label);
    info!("General Topic: {}", config.notification.general_topic);
    info!(
        "Critical Topic: {}",
        config
            .notification
            .critical_topic
            .as_deref()
            .unwrap_or("(general)")
    );
    if mode == Mode::Poll {
        info!("Role ARN: {}", config.poller.role_arn);
        info!("Audit Trail Region: {}", config.poller.region);
        info!(
            "Lookback: {}s, Interval: {}s",
            config.poller.lookback_seconds, config.poller.interval_seconds
        );
    }
    info!("-------------------------------------------------------");

    let snapshot = if config.metrics.log_metrics {
        Some(LoggingRecorder::install()?)
    } else {
        None
    };
    describe_metrics();

    let app = Arc::new(App::builder(config).build(mode).await?);

    match command {
        Command::Relay { event } => {
            let envelope = read_envelope(&event)?;
            let outcome = app.relay_event(envelope).await;
            if let Some(snapshot) = &snapshot {
                snapshot.log_snapshot();
            }
            match outcome? {
                RelayOutcome::Published { message_id } => info!(%message_id, "Alert published."),
                RelayOutcome::Skipped => info!("Event skipped."),
            }
        }
        Command::Poll { once: true } => {
            if let Some(report) = app.poll_once().await? {
                println!("{}", serde_json::to_string_pretty(&report.summary())?);
            }
            if let Some(snapshot) = &snapshot {
                snapshot.log_snapshot();
            }
        }
        Command::Poll { once: false } => {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl-C received, shutting down.");
                    let _ = shutdown_tx.send(true);
                }
            });
            app.run_poll_loop(shutdown_rx).await?;
            if let Some(snapshot) = &snapshot {
                snapshot.log_snapshot();
            }
        }
        Command::Lambda { mode } => {
            lambda::serve(app, mode, snapshot)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
        }
    }

    info!("ZoneWatch finished.");
    Ok(())
}

/// Reads a JSON envelope from `path`, or from stdin when `path` is "-".
fn read_envelope(path: &Path) -> Result<Value> {
    let raw = if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("failed to read event from stdin")?;
        raw
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read event file {}", path.display()))?
    };
    serde_json::from_str(&raw).context("event is not valid JSON")
}
