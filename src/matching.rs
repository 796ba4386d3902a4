//! Relevance matching for raw events
//!
//! An event is a zone change iff its event source AND its event name are
//! both in the configured sets. Absent or non-string fields never match.

use crate::{config::MatchingConfig, core::RawEvent};
use std::collections::HashSet;

/// The event source of the Route 53 management API.
pub const ZONE_CHANGE_SOURCE: &str = "route53.amazonaws.com";

/// The API actions that change a hosted zone.
pub const ZONE_CHANGE_EVENTS: [&str; 4] = [
    "ChangeResourceRecordSets",
    "CreateHostedZone",
    "DeleteHostedZone",
    "UpdateHostedZoneComment",
];

/// An immutable set of accepted event sources and event names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRule {
    sources: HashSet<String>,
    names: HashSet<String>,
}

impl MatchRule {
    pub fn new<S, N>(sources: S, names: N) -> Self
    where
        S: IntoIterator,
        S::Item: Into<String>,
        N: IntoIterator,
        N::Item: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The fixed rule set for hosted zone changes.
    ///
    /// Only `route53.amazonaws.com` is accepted. Events from any other source
    /// name, such as `zone-change-service`, need `[matching] event_sources`.
    pub fn zone_changes() -> Self {
        Self::new([ZONE_CHANGE_SOURCE], ZONE_CHANGE_EVENTS)
    }

    pub fn from_config(config: &MatchingConfig) -> Self {
        Self::new(config.event_sources.clone(), config.event_names.clone())
    }

    /// Evaluates the rule against an event. Never fails.
    pub fn is_match(&self, event: &RawEvent) -> bool {
        match (event.event_source(), event.event_name()) {
            (Some(source), Some(name)) => {
                self.sources.contains(source) && self.names.contains(name)
            }
            _ => false,
        }
    }
}

impl Default for MatchRule {
    fn default() -> Self {
        Self::zone_changes()
    }
}

/// Returns whether `event` is relevant under `rule`.
pub fn matches(event: &RawEvent, rule: &MatchRule) -> bool {
    let _span = tracing::trace_span!("matches").entered();
    rule.is_match(event)
}
