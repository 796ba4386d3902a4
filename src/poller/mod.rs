//! The cross-account poller.
//!
//! Each tick is an independent run through
//! `Idle -> AssumingRole -> Querying -> Filtering -> Publishing -> Idle`.
//! A failure to assume the role or query the trail ends the run in `Failed`
//! after a critical self-notification; the tick itself still completes.
//!
//! The lookup window is re-derived on every tick as `[now - lookback, now]`.
//! Nothing is remembered between ticks, so ticks closer together than the
//! lookback re-detect the same records, and ticks further apart than the
//! lookback skip the records in between.

pub mod cloudtrail;
pub mod sts;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use crate::core::{AuditTrail, CrossAccountAccess, LookupQuery, RawEvent};
use crate::matching::{matches, MatchRule};
use crate::normalize::normalize;
use crate::notification::{DispatchError, Dispatcher, NotificationChannel, Severity};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// CloudTrail event history retention; lookups never reach further back.
pub const MAX_LOOKBACK: std::time::Duration = std::time::Duration::from_secs(90 * 24 * 60 * 60);

/// The states a single poll run moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    AssumingRole,
    Querying,
    Filtering,
    Publishing,
    Failed,
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollState::Idle => "idle",
            PollState::AssumingRole => "assuming_role",
            PollState::Querying => "querying",
            PollState::Filtering => "filtering",
            PollState::Publishing => "publishing",
            PollState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("failed to assume role {role_arn}: {source:#}")]
    CredentialAssumption {
        role_arn: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("audit trail lookup failed: {0:#}")]
    AuditQuery(#[source] anyhow::Error),
}

/// The time span queried by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Latest event time seen in this window; never carried to the next tick.
    pub last_seen_event_time: Option<DateTime<Utc>>,
}

impl PollWindow {
    /// The window `[now - lookback, now]`.
    ///
    /// A lookback longer than `MAX_LOOKBACK` is clamped to it.
    pub fn ending_at(now: DateTime<Utc>, lookback: std::time::Duration) -> Self {
        let lookback = if lookback > MAX_LOOKBACK {
            warn!(
                requested = lookback.as_secs(),
                max = MAX_LOOKBACK.as_secs(),
                "Lookback exceeds the audit trail's retention, clamping."
            );
            MAX_LOOKBACK
        } else {
            lookback
        };
        let span = chrono::Duration::from_std(lookback).unwrap_or_else(|_| chrono::Duration::days(90));
        Self {
            start: now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC),
            end: now,
            last_seen_event_time: None,
        }
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time <= self.end
    }

    fn observe(&mut self, time: Option<DateTime<Utc>>) {
        if let Some(time) = time {
            if self.last_seen_event_time.map_or(true, |seen| time > seen) {
                self.last_seen_event_time = Some(time);
            }
        }
    }
}

/// A publish failure for one record of a run.
#[derive(Debug)]
pub struct RecordFailure {
    /// Position of the record in the lookup result.
    pub index: usize,
    pub event_name: String,
    pub error: DispatchError,
}

#[derive(Debug)]
pub enum PollOutcome {
    Completed,
    Failed { stage: PollState, error: PollError },
}

/// What a single tick did.
#[derive(Debug)]
pub struct PollReport {
    pub window: PollWindow,
    pub outcome: PollOutcome,
    /// Records returned by the lookup.
    pub fetched: usize,
    /// Records that passed the matcher.
    pub matched: usize,
    /// Message ids of published alerts, in record order.
    pub published: Vec<String>,
    pub failures: Vec<RecordFailure>,
    /// Always `Idle`: every run returns to idle.
    pub final_state: PollState,
}

impl PollReport {
    fn new(window: PollWindow) -> Self {
        Self {
            window,
            outcome: PollOutcome::Completed,
            fetched: 0,
            matched: 0,
            published: Vec::new(),
            failures: Vec::new(),
            final_state: PollState::Idle,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, PollOutcome::Failed { .. })
    }

    /// A JSON summary for invocation responses.
    pub fn summary(&self) -> serde_json::Value {
        let (status, stage, error) = match &self.outcome {
            PollOutcome::Completed => ("completed", None, None),
            PollOutcome::Failed { stage, error } => {
                ("failed", Some(stage.to_string()), Some(error.to_string()))
            }
        };
        serde_json::json!({
            "status": status,
            "failedStage": stage,
            "error": error,
            "windowStart": self.window.start.to_rfc3339(),
            "windowEnd": self.window.end.to_rfc3339(),
            "fetched": self.fetched,
            "matched": self.matched,
            "published": self.published,
            "publishFailures": self.failures.len(),
        })
    }
}

/// Settings for the cross-account lookup.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub role_arn: String,
    pub external_id: String,
    pub session_name: String,
    pub event_source_filter: String,
    pub lookback: std::time::Duration,
    pub max_results: i32,
}

impl PollerSettings {
    pub fn from_config(config: &crate::config::PollerConfig) -> Self {
        Self {
            role_arn: config.role_arn.clone(),
            external_id: config.external_id.clone(),
            session_name: config.session_name.clone(),
            event_source_filter: config.event_source_filter.clone(),
            lookback: config.lookback(),
            max_results: config.max_results,
        }
    }

    /// The monitored account, parsed from `arn:<partition>:iam::<account>:role/<name>`.
    pub fn monitored_account(&self) -> Option<&str> {
        let mut parts = self.role_arn.split(':');
        let account = parts.nth(4)?;
        (account.len() == 12 && account.chars().all(|c| c.is_ascii_digit())).then_some(account)
    }
}

pub struct CrossAccountPoller {
    access: Arc<dyn CrossAccountAccess>,
    trail: Arc<dyn AuditTrail>,
    dispatcher: Arc<Dispatcher>,
    rule: MatchRule,
    channel: NotificationChannel,
    origin_label: String,
    function_label: String,
    settings: PollerSettings,
}

impl CrossAccountPoller {
    pub fn new(
        access: Arc<dyn CrossAccountAccess>,
        trail: Arc<dyn AuditTrail>,
        dispatcher: Arc<Dispatcher>,
        rule: MatchRule,
        origin_label: impl Into<String>,
        function_label: impl Into<String>,
        settings: PollerSettings,
    ) -> Self {
        let channel = dispatcher.channels().general.clone();
        Self {
            access,
            trail,
            dispatcher,
            rule,
            channel,
            origin_label: origin_label.into(),
            function_label: function_label.into(),
            settings,
        }
    }

    /// Runs one tick with the window ending now.
    pub async fn tick(&self) -> PollReport {
        self.run_tick(Utc::now()).await
    }

    /// Runs one tick with the window ending at `now`.
    #[instrument(skip(self), fields(origin = %self.origin_label))]
    pub async fn run_tick(&self, now: DateTime<Utc>) -> PollReport {
        let started = Instant::now();
        let mut window = PollWindow::ending_at(now, self.settings.lookback);
        let mut report = PollReport::new(window);
        debug!(state = %PollState::Idle, "Poll tick started.");

        // AssumingRole
        debug!(state = %PollState::AssumingRole, role_arn = %self.settings.role_arn);
        let credentials = match self
            .access
            .assume_role(
                &self.settings.role_arn,
                &self.settings.session_name,
                &self.settings.external_id,
            )
            .await
        {
            Ok(credentials) => credentials,
            Err(source) => {
                let error = PollError::CredentialAssumption {
                    role_arn: self.settings.role_arn.clone(),
                    source,
                };
                return self
                    .fail(report, PollState::AssumingRole, error, started)
                    .await;
            }
        };

        // Querying
        let query = LookupQuery {
            event_source: self.settings.event_source_filter.clone(),
            start_time: window.start,
            end_time: window.end,
            max_results: self.settings.max_results,
        };
        debug!(state = %PollState::Querying, start = %query.start_time, end = %query.end_time);
        let records = match self.trail.lookup_events(&credentials, &query).await {
            Ok(records) => records,
            Err(source) => {
                return self
                    .fail(report, PollState::Querying, PollError::AuditQuery(source), started)
                    .await;
            }
        };
        report.fetched = records.len();

        // Filtering
        let account = self.settings.monitored_account().map(str::to_string);
        let candidates: Vec<(usize, RawEvent)> = records
            .into_iter()
            .enumerate()
            .map(|(index, mut record)| {
                window.observe(record.event_time);
                if record.account_id.is_none() {
                    record.account_id = account.clone();
                }
                (index, RawEvent::Pulled(record))
            })
            .filter(|(_, event)| {
                let relevant = matches(event, &self.rule);
                if !relevant {
                    debug!(
                        event_name = event.event_name().unwrap_or("<none>"),
                        "Skipping non-matching record."
                    );
                }
                relevant
            })
            .collect();
        report.matched = candidates.len();
        report.window = window;
        debug!(
            state = %PollState::Filtering,
            fetched = report.fetched,
            matched = report.matched
        );
        metrics::counter!("events_received_total", "mode" => "poll").increment(report.fetched as u64);
        metrics::counter!("events_skipped_total", "mode" => "poll")
            .increment((report.fetched - report.matched) as u64);

        // Publishing
        for (index, event) in candidates {
            let alert = normalize(&event, &self.origin_label);
            info!(
                state = %PollState::Publishing,
                event_name = %alert.event_name,
                event_time = %alert.event_time,
                "Found zone change in monitored account."
            );
            match self.dispatcher.dispatch(&alert, &self.channel).await {
                Ok(message_id) => {
                    metrics::counter!("alerts_published_total", "mode" => "poll").increment(1);
                    report.published.push(message_id);
                }
                Err(error) => {
                    error!(index, event_name = %alert.event_name, error = %error, "Failed to publish alert; continuing with remaining records.");
                    metrics::counter!("alert_publish_failures_total", "mode" => "poll").increment(1);
                    report.failures.push(RecordFailure {
                        index,
                        event_name: alert.event_name,
                        error,
                    });
                }
            }
        }

        if report.matched == 0 {
            info!("No zone changes found in window.");
        }
        metrics::counter!("poll_runs_total", "outcome" => "completed").increment(1);
        metrics::histogram!("poll_tick_duration_seconds").record(started.elapsed().as_secs_f64());
        debug!(state = %PollState::Idle, "Poll tick finished.");
        report
    }

    async fn fail(
        &self,
        mut report: PollReport,
        stage: PollState,
        error: PollError,
        started: Instant,
    ) -> PollReport {
        error!(state = %PollState::Failed, %stage, error = %error, "Poll run failed.");
        self.dispatcher
            .notify(
                Severity::Critical,
                &self.function_label,
                &format!(
                    "Cross-account poll for {} failed while {}: {}",
                    self.origin_label, stage, error
                ),
            )
            .await;
        metrics::counter!("poll_runs_total", "outcome" => "failed").increment(1);
        metrics::histogram!("poll_tick_duration_seconds").record(started.elapsed().as_secs_f64());
        report.outcome = PollOutcome::Failed { stage, error };
        report.final_state = PollState::Idle;
        report
    }
}
