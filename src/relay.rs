//! The push relay: forwards an already-delivered change event.
//!
//! The upstream bus is expected to pre-filter, but the relay re-runs the
//! matcher so that stray deliveries are skipped rather than published.

use crate::core::RawEvent;
use crate::matching::{matches, MatchRule};
use crate::normalize::normalize;
use crate::notification::{DispatchError, Dispatcher, NotificationChannel};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Result of relaying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    Published { message_id: String },
    Skipped,
}

pub struct PushRelay {
    rule: MatchRule,
    dispatcher: Arc<Dispatcher>,
    channel: NotificationChannel,
    origin_label: String,
}

impl PushRelay {
    /// Creates a relay publishing to the dispatcher's general channel.
    pub fn new(rule: MatchRule, dispatcher: Arc<Dispatcher>, origin_label: impl Into<String>) -> Self {
        let channel = dispatcher.channels().general.clone();
        Self {
            rule,
            dispatcher,
            channel,
            origin_label: origin_label.into(),
        }
    }

    /// Relays `event`, publishing exactly once when it matches.
    ///
    /// Publish failures are returned to the caller so that the invocation is
    /// reported as failed.
    #[instrument(skip_all, fields(origin = %self.origin_label))]
    pub async fn handle(&self, event: &RawEvent) -> Result<RelayOutcome, DispatchError> {
        info!(
            event_source = event.event_source().unwrap_or("<none>"),
            event_name = event.event_name().unwrap_or("<none>"),
            "Received change event from {}.",
            self.origin_label
        );
        metrics::counter!("events_received_total", "mode" => "push").increment(1);

        if !matches(event, &self.rule) {
            warn!("Event does not match the zone change rules; skipping.");
            metrics::counter!("events_skipped_total", "mode" => "push").increment(1);
            return Ok(RelayOutcome::Skipped);
        }

        let alert = normalize(event, &self.origin_label);
        match self.dispatcher.dispatch(&alert, &self.channel).await {
            Ok(message_id) => {
                metrics::counter!("alerts_published_total", "mode" => "push").increment(1);
                Ok(RelayOutcome::Published { message_id })
            }
            Err(e) => {
                metrics::counter!("alert_publish_failures_total", "mode" => "push").increment(1);
                Err(e)
            }
        }
    }
}
