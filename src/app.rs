//! The main application logic, decoupled from the entry point.

use crate::{
    config::{Config, Mode},
    core::{AuditTrail, CrossAccountAccess, PushEnvelope, Publisher, RawEvent},
    matching::MatchRule,
    notification::{sns::SnsPublisher, Dispatcher, Severity},
    poller::{
        cloudtrail::CloudTrailAudit, sts::StsAccess, CrossAccountPoller, PollReport,
        PollerSettings,
    },
    relay::{PushRelay, RelayOutcome},
};
use anyhow::{anyhow, Result};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::sync::{watch, OnceCell};
use tracing::{info, instrument, warn};

/// A handle to the wired-up pipeline for one invocation mode.
pub struct App {
    invocation_timeout: Duration,
    interval: Duration,
    function_label: String,
    dispatcher: Arc<Dispatcher>,
    relay: PushRelay,
    poller: Option<CrossAccountPoller>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// Relays one push-delivered envelope within the invocation timeout.
    #[instrument(skip_all)]
    pub async fn relay_event(&self, envelope: Value) -> Result<RelayOutcome> {
        let event = RawEvent::Push(PushEnvelope::new(envelope));
        match tokio::time::timeout(self.invocation_timeout, self.relay.handle(&event)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(anyhow!(
                "relay did not complete within {:?}",
                self.invocation_timeout
            )),
        }
    }

    /// Runs one poll tick within the invocation timeout.
    ///
    /// Returns `None` if the tick was cut short by the timeout.
    pub async fn poll_once(&self) -> Result<Option<PollReport>> {
        let poller = self
            .poller
            .as_ref()
            .ok_or_else(|| anyhow!("application was not built for poll mode"))?;

        match tokio::time::timeout(self.invocation_timeout, poller.tick()).await {
            Ok(report) => Ok(Some(report)),
            Err(_) => {
                warn!(timeout = ?self.invocation_timeout, "Poll tick timed out.");
                self.dispatcher
                    .notify(
                        Severity::Critical,
                        &self.function_label,
                        &format!("Poll tick exceeded {:?}", self.invocation_timeout),
                    )
                    .await;
                Ok(None)
            }
        }
    }

    /// Ticks on the configured interval until `shutdown_rx` flips to true.
    pub async fn run_poll_loop(&self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval = ?self.interval, "Starting poll loop.");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping poll loop.");
                    break;
                }
                _ = interval.tick() => {
                    if let Some(report) = self.poll_once().await? {
                        info!(summary = %report.summary(), "Poll tick complete.");
                    }
                }
            }
        }
        Ok(())
    }
}

/// Builder for the main application.
///
/// Capabilities default to their AWS-backed implementations; tests swap in
/// doubles through the override methods.
pub struct AppBuilder {
    config: Config,
    publisher_override: Option<Arc<dyn Publisher>>,
    access_override: Option<Arc<dyn CrossAccountAccess>>,
    trail_override: Option<Arc<dyn AuditTrail>>,
    rule_override: Option<MatchRule>,
}

impl AppBuilder {
    /// Creates a new `AppBuilder` with the given configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            publisher_override: None,
            access_override: None,
            trail_override: None,
            rule_override: None,
        }
    }

    /// Overrides the notification publisher for testing.
    pub fn publisher_override(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher_override = Some(publisher);
        self
    }

    /// Overrides the cross-account credential source for testing.
    pub fn access_override(mut self, access: Arc<dyn CrossAccountAccess>) -> Self {
        self.access_override = Some(access);
        self
    }

    /// Overrides the audit trail for testing.
    pub fn trail_override(mut self, trail: Arc<dyn AuditTrail>) -> Self {
        self.trail_override = Some(trail);
        self
    }

    /// Replaces the configured match rule.
    pub fn rule_override(mut self, rule: MatchRule) -> Self {
        self.rule_override = Some(rule);
        self
    }

    /// Builds the `App` for `mode`. AWS configuration is loaded from the
    /// environment only if a capability was not overridden.
    pub async fn build(self, mode: Mode) -> Result<App> {
        let config = self.config;
        let shared_config = OnceCell::new();
        let load_aws = || async { aws_config::from_env().load().await };

        let publisher: Arc<dyn Publisher> = match self.publisher_override {
            Some(publisher) => publisher,
            None => Arc::new(SnsPublisher::new(
                shared_config.get_or_init(load_aws).await.clone(),
            )),
        };

        let dispatcher = Arc::new(Dispatcher::new(publisher, config.notification.channels()));
        let rule = self
            .rule_override
            .unwrap_or_else(|| MatchRule::from_config(&config.matching));

        let poller = match mode {
            Mode::Push => None,
            Mode::Poll => {
                let access: Arc<dyn CrossAccountAccess> = match self.access_override {
                    Some(access) => access,
                    None => Arc::new(StsAccess::new(shared_config.get_or_init(load_aws).await)),
                };
                let trail: Arc<dyn AuditTrail> = match self.trail_override {
                    Some(trail) => trail,
                    None => Arc::new(CloudTrailAudit::new(config.poller.region.clone())),
                };
                Some(CrossAccountPoller::new(
                    access,
                    trail,
                    dispatcher.clone(),
                    rule.clone(),
                    config.origin_label.clone(),
                    config.function_label.clone(),
                    PollerSettings::from_config(&config.poller),
                ))
            }
        };

        let relay = PushRelay::new(rule, dispatcher.clone(), config.origin_label.clone());
        info!(?mode, origin = %config.origin_label, "Application built.");

        Ok(App {
            invocation_timeout: config.invocation_timeout(),
            interval: config.poller.interval(),
            function_label: config.function_label,
            dispatcher,
            relay,
            poller,
        })
    }
}
