//! Notification channels and region resolution.
//!
//! The region a channel publishes to is always derived from its topic
//! identifier. A channel whose identifier cannot be parsed, or whose explicit
//! region disagrees with the identifier, never resolves.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static REGION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$").expect("static region pattern"));

/// The severity class a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    General,
    Critical,
}

impl Severity {
    pub fn as_lowercase(&self) -> &'static str {
        match self {
            Severity::General => "general",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::General => write!(f, "GENERAL"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("cannot derive a region from topic identifier '{0}'")]
    MalformedIdentifier(String),

    #[error("configured region '{configured}' does not match '{derived}' in the topic identifier")]
    RegionMismatch { configured: String, derived: String },
}

/// A notification destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannel {
    pub topic_arn: String,
    /// An optional explicit region; must agree with the topic ARN.
    pub region: Option<String>,
    pub severity: Severity,
}

/// A channel whose delivery region has been resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChannel {
    pub topic_arn: String,
    pub region: String,
    pub severity: Severity,
}

impl NotificationChannel {
    pub fn new(topic_arn: impl Into<String>, severity: Severity) -> Self {
        Self {
            topic_arn: topic_arn.into(),
            region: None,
            severity,
        }
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region.filter(|r| !r.is_empty());
        self
    }

    /// Resolves the delivery region from the topic ARN.
    pub fn resolve(&self) -> Result<ResolvedChannel, ChannelError> {
        let derived = resolve_region(&self.topic_arn)
            .ok_or_else(|| ChannelError::MalformedIdentifier(self.topic_arn.clone()))?;

        if let Some(configured) = &self.region {
            if *configured != derived {
                return Err(ChannelError::RegionMismatch {
                    configured: configured.clone(),
                    derived,
                });
            }
        }

        Ok(ResolvedChannel {
            topic_arn: self.topic_arn.clone(),
            region: derived,
            severity: self.severity,
        })
    }
}

/// Extracts the region from a topic identifier.
///
/// Accepts `<scheme>:<service>:<region>:<account>:<name>` and the full ARN
/// form with a partition, `arn:<partition>:<service>:<region>:<account>:<name>`.
/// Returns `None` for anything else.
pub fn resolve_region(identifier: &str) -> Option<String> {
    let parts: Vec<&str> = identifier.split(':').collect();
    if !(5..=6).contains(&parts.len()) {
        return None;
    }
    let (prefix, tail) = parts.split_at(parts.len() - 3);
    let [region, account, name] = tail else {
        return None;
    };
    if prefix.iter().any(|part| part.is_empty()) || name.is_empty() {
        return None;
    }
    if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !REGION_PATTERN.is_match(region) {
        return None;
    }
    Some(region.to_string())
}

/// The general channel and the optional critical escalation channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet {
    pub general: NotificationChannel,
    pub critical: Option<NotificationChannel>,
}

impl ChannelSet {
    /// The channel for `severity`. Critical falls back to general when no
    /// critical channel is configured.
    pub fn for_severity(&self, severity: Severity) -> &NotificationChannel {
        match severity {
            Severity::General => &self.general,
            Severity::Critical => self.critical.as_ref().unwrap_or(&self.general),
        }
    }
}
