//! Publishes alerts and self-monitoring notifications.
//!
//! `dispatch` makes exactly one publish attempt per call and never retries;
//! the caller decides how a failure is escalated. `notify` never fails.

use crate::core::{Alert, Publisher};
use crate::formatting::{self, AlertFormatter, ChangeAlertFormatter};
use crate::notification::channel::{ChannelError, ChannelSet, NotificationChannel, Severity};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The channel's region could not be resolved; nothing was published.
    #[error("unresolvable notification channel: {0}")]
    UnresolvableChannel(#[from] ChannelError),

    /// The notification transport rejected or failed the publish.
    #[error("publish failed: {0:#}")]
    PublishFailed(#[source] anyhow::Error),
}

pub struct Dispatcher {
    publisher: Arc<dyn Publisher>,
    formatter: Box<dyn AlertFormatter>,
    channels: ChannelSet,
}

impl Dispatcher {
    pub fn new(publisher: Arc<dyn Publisher>, channels: ChannelSet) -> Self {
        Self {
            publisher,
            formatter: Box::new(ChangeAlertFormatter),
            channels,
        }
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    /// Publishes `alert` to `channel`, returning the transport's message id.
    #[instrument(skip_all, fields(event_name = %alert.event_name, topic = %channel.topic_arn))]
    pub async fn dispatch(
        &self,
        alert: &Alert,
        channel: &NotificationChannel,
    ) -> Result<String, DispatchError> {
        let resolved = channel.resolve()?;
        let subject = self.formatter.subject(alert);
        let body = self.formatter.body(alert);

        let message_id = self
            .publisher
            .publish(&resolved.region, &resolved.topic_arn, &subject, &body)
            .await
            .map_err(DispatchError::PublishFailed)?;

        info!(%message_id, region = %resolved.region, "Published change alert.");
        Ok(message_id)
    }

    /// Sends a self-monitoring notification on the channel for `severity`.
    ///
    /// Failures are logged and swallowed.
    #[instrument(skip(self, text))]
    pub async fn notify(&self, severity: Severity, function_label: &str, text: &str) {
        let channel = self.channels.for_severity(severity);
        info!(
            "Sending {} notification to {}: {}",
            severity.as_lowercase(),
            channel.topic_arn,
            text
        );

        let resolved = match channel.resolve() {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(error = %e, "Cannot send {} notification.", severity.as_lowercase());
                metrics::counter!("self_notifications_total", "severity" => severity.as_lowercase(), "status" => "unresolvable").increment(1);
                return;
            }
        };
        if resolved.severity != severity {
            warn!(
                "No {} channel configured, using the {} channel.",
                severity.as_lowercase(),
                resolved.severity.as_lowercase()
            );
        }

        let (subject, body) = formatting::self_notification(severity, function_label, text);
        match self
            .publisher
            .publish(&resolved.region, &resolved.topic_arn, &subject, &body)
            .await
        {
            Ok(_) => {
                metrics::counter!("self_notifications_total", "severity" => severity.as_lowercase(), "status" => "sent").increment(1);
            }
            Err(e) => {
                error!("SNS:Publish failed: {:#}", e);
                metrics::counter!("self_notifications_total", "severity" => severity.as_lowercase(), "status" => "failed").increment(1);
            }
        }
    }
}
