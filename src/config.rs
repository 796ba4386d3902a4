//! Configuration management for ZoneWatch
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to load configuration from a `zonewatch.toml` file and merge it
//! with environment variables and command-line arguments.

use crate::cli::Cli;
use crate::matching::{ZONE_CHANGE_EVENTS, ZONE_CHANGE_SOURCE};
use crate::notification::{ChannelSet, NotificationChannel, Severity};
use crate::poller::MAX_LOOKBACK;
use anyhow::{bail, Result};
use clap::ValueEnum;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// The default configuration file, read from the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "zonewatch.toml";

/// Environment variable names used by earlier deployments of the forwarder.
const LEGACY_ENV_KEYS: [&str; 3] = [
    "ENVIRONMENT_NAME",
    "GENERAL_NOTIFICATION_TOPIC",
    "CRITICAL_NOTIFICATION_TOPIC",
];

/// The invocation mode the process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Relay already-delivered change events.
    Push,
    /// Poll a monitored account's audit trail.
    Poll,
}

/// The format of log output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Human label of the monitored account, e.g. "MASTER Account".
    pub origin_label: String,
    /// Name used in self-monitoring notifications.
    pub function_label: String,
    /// Upper bound on a single push invocation or poll tick.
    pub invocation_timeout_seconds: u64,
    /// Which events count as zone changes.
    pub matching: MatchingConfig,
    /// Where alerts and self-monitoring notifications go.
    pub notification: NotificationConfig,
    /// Cross-account polling settings.
    pub poller: PollerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Configuration for the metrics system.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct MetricsConfig {
    /// Log a snapshot of all counters after each invocation.
    #[serde(default)]
    pub log_metrics: bool,
}

/// Configuration for event matching.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MatchingConfig {
    pub event_sources: Vec<String>,
    pub event_names: Vec<String>,
}

/// Configuration for notification channels.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct NotificationConfig {
    /// Topic ARN receiving change alerts and general notifications.
    pub general_topic: String,
    /// Optional explicit region; must agree with `general_topic`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_region: Option<String>,
    /// Topic ARN receiving critical notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_region: Option<String>,
}

impl NotificationConfig {
    pub fn channels(&self) -> ChannelSet {
        ChannelSet {
            general: NotificationChannel::new(self.general_topic.clone(), Severity::General)
                .with_region(self.general_region.clone()),
            critical: self
                .critical_topic
                .as_ref()
                .filter(|topic| !topic.is_empty())
                .map(|topic| {
                    NotificationChannel::new(topic.clone(), Severity::Critical)
                        .with_region(self.critical_region.clone())
                }),
        }
    }
}

/// Configuration for the cross-account poller.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PollerConfig {
    /// Role assumed in the monitored account.
    pub role_arn: String,
    /// External id required by the role's trust policy.
    pub external_id: String,
    pub session_name: String,
    /// Region of the monitored account's audit trail.
    pub region: String,
    /// Span of each lookup window, measured back from the tick.
    pub lookback_seconds: u64,
    /// Interval between ticks when the process runs its own schedule.
    pub interval_seconds: u64,
    /// Maximum records fetched per tick.
    pub max_results: i32,
    /// Event source the lookup is filtered by.
    pub event_source_filter: String,
    /// Refuse to start when the lookback does not cover the interval.
    #[serde(default)]
    pub enforce_window_coverage: bool,
}

impl PollerConfig {
    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_seconds)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl Config {
    /// Loads the application configuration.
    ///
    /// Layers, lowest precedence first: built-in defaults, the TOML file
    /// (`--config` or `zonewatch.toml`), legacy environment variables,
    /// `ZONEWATCH_` environment variables, then command-line arguments.
    pub fn load(cli: &Cli) -> Result<Self> {
        let toml = match &cli.config {
            Some(path) if !path.exists() => {
                bail!("configuration file not found: {}", path.display())
            }
            Some(path) => Toml::file(path),
            None => Toml::file(DEFAULT_CONFIG_FILE),
        };

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(toml)
            .merge(legacy_env())
            // e.g. ZONEWATCH_POLLER__ROLE_ARN=arn:aws:iam::...
            .merge(Env::prefixed("ZONEWATCH_").split("__"))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_secs(self.invocation_timeout_seconds)
    }

    /// Checks the settings `mode` depends on.
    pub fn validate(&self, mode: Mode) -> Result<()> {
        if self.notification.general_topic.trim().is_empty() {
            bail!("notification.general_topic must be set");
        }
        if self.invocation_timeout_seconds == 0 {
            bail!("invocation_timeout_seconds must be greater than zero");
        }
        if mode == Mode::Poll {
            let poller = &self.poller;
            if poller.role_arn.trim().is_empty() {
                bail!("poller.role_arn must be set in poll mode");
            }
            if poller.external_id.trim().is_empty() {
                bail!("poller.external_id must be set in poll mode");
            }
            if poller.lookback_seconds == 0 {
                bail!("poller.lookback_seconds must be greater than zero");
            }
            if poller.lookback_seconds > MAX_LOOKBACK.as_secs() {
                bail!(
                    "poller.lookback_seconds must be at most {} (the audit trail's retention), got {}",
                    MAX_LOOKBACK.as_secs(),
                    poller.lookback_seconds
                );
            }
            if poller.interval_seconds == 0 {
                bail!("poller.interval_seconds must be greater than zero");
            }
            if !(1..=50).contains(&poller.max_results) {
                bail!(
                    "poller.max_results must be between 1 and 50, got {}",
                    poller.max_results
                );
            }
            if poller.lookback_seconds < poller.interval_seconds {
                if poller.enforce_window_coverage {
                    bail!(
                        "poller.lookback_seconds ({}) is shorter than poller.interval_seconds ({}); changes between windows would be missed",
                        poller.lookback_seconds,
                        poller.interval_seconds
                    );
                }
                warn!(
                    lookback = poller.lookback_seconds,
                    interval = poller.interval_seconds,
                    "Lookback window is shorter than the poll interval; changes between windows will be missed."
                );
            }
        }
        Ok(())
    }
}

/// Maps the variable names of earlier deployments onto config keys.
fn legacy_env() -> Env {
    Env::raw().only(&LEGACY_ENV_KEYS).map(|key| {
        match key.as_str().to_ascii_uppercase().as_str() {
            "ENVIRONMENT_NAME" => "origin_label".into(),
            "GENERAL_NOTIFICATION_TOPIC" => "notification.general_topic".into(),
            _ => "notification.critical_topic".into(),
        }
    })
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            origin_label: "Unknown".to_string(),
            function_label: "zonewatch".to_string(),
            invocation_timeout_seconds: 60,
            matching: MatchingConfig {
                event_sources: vec![ZONE_CHANGE_SOURCE.to_string()],
                event_names: ZONE_CHANGE_EVENTS.iter().map(|s| s.to_string()).collect(),
            },
            notification: NotificationConfig::default(),
            poller: PollerConfig {
                role_arn: String::new(),
                external_id: String::new(),
                session_name: "zonewatch-poller".to_string(),
                region: "us-east-1".to_string(),
                lookback_seconds: 300,
                interval_seconds: 300,
                max_results: 10,
                event_source_filter: ZONE_CHANGE_SOURCE.to_string(),
                enforce_window_coverage: false,
            },
            metrics: MetricsConfig::default(),
        }
    }
}
