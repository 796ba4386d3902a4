//! Core domain types and capability traits for ZoneWatch
//!
//! This module defines the raw event shapes the monitor consumes, the
//! canonical `Alert` it produces, and the trait contracts for the external
//! capabilities (credential assumption, audit lookup, publishing) that the
//! pipeline components are constructed with.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Placeholder written into every alert field whose source value is absent.
pub const UNKNOWN: &str = "Unknown";

/// A record from either delivery path, before any relevance decision.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    /// An envelope delivered by the upstream event bus.
    Push(PushEnvelope),
    /// A record pulled from a monitored account's audit trail.
    Pulled(AuditRecord),
}

impl RawEvent {
    /// The API service that emitted the call, if present and a string.
    pub fn event_source(&self) -> Option<&str> {
        match self {
            RawEvent::Push(envelope) => envelope.detail_str("eventSource"),
            RawEvent::Pulled(record) => record
                .event_source
                .as_deref()
                .or_else(|| record.detail_str("eventSource")),
        }
    }

    /// The API action name, if present and a string.
    pub fn event_name(&self) -> Option<&str> {
        match self {
            RawEvent::Push(envelope) => envelope.detail_str("eventName"),
            RawEvent::Pulled(record) => record
                .event_name
                .as_deref()
                .or_else(|| record.detail_str("eventName")),
        }
    }
}

impl From<PushEnvelope> for RawEvent {
    fn from(envelope: PushEnvelope) -> Self {
        RawEvent::Push(envelope)
    }
}

impl From<AuditRecord> for RawEvent {
    fn from(record: AuditRecord) -> Self {
        RawEvent::Pulled(record)
    }
}

/// A push-delivered event envelope.
///
/// The envelope is kept as untyped JSON so that a malformed or partial
/// delivery never fails to deserialize; every accessor is a defensive lookup.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PushEnvelope(pub Value);

impl PushEnvelope {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The `time` field of the envelope.
    pub fn time(&self) -> Option<&Value> {
        self.0.get("time")
    }

    /// The originating account of the envelope.
    pub fn account(&self) -> Option<&Value> {
        self.0.get("account")
    }

    /// A field nested under `detail`.
    pub fn detail(&self, field: &str) -> Option<&Value> {
        self.0.get("detail").and_then(|detail| detail.get(field))
    }

    fn detail_str(&self, field: &str) -> Option<&str> {
        self.detail(field).and_then(Value::as_str)
    }
}

/// A record returned by an audit trail lookup.
///
/// `detail` holds the parsed serialized event blob; `Value::Null` when the
/// blob was missing or not valid JSON.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuditRecord {
    pub event_name: Option<String>,
    pub event_time: Option<DateTime<Utc>>,
    pub event_source: Option<String>,
    pub source_ip_address: Option<String>,
    /// The monitored account, stamped by the poller.
    pub account_id: Option<String>,
    pub detail: Value,
}

impl AuditRecord {
    /// Attaches the serialized event blob, parsing it leniently.
    pub fn with_serialized_event(mut self, blob: Option<&str>) -> Self {
        self.detail = blob
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or(Value::Null);
        self
    }

    /// A field of the serialized event blob.
    pub fn detail(&self, field: &str) -> Option<&Value> {
        self.detail.get(field)
    }

    fn detail_str(&self, field: &str) -> Option<&str> {
        self.detail(field).and_then(Value::as_str)
    }
}

/// The canonical, normalized alert published for a zone change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub event_time: String,
    pub event_name: String,
    pub event_source: String,
    #[serde(rename = "sourceIPAddress")]
    pub source_ip_address: String,
    pub user_identity: Value,
    pub request_parameters: Value,
    pub response_elements: Value,
    pub account_id: String,
    /// Human label of the monitored account or environment.
    pub origin_label: String,
}

// =============================================================================
// Capability Traits
// =============================================================================

/// Temporary credentials obtained by assuming a role in another account.
#[derive(Clone, PartialEq)]
pub struct TemporaryCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime<Utc>>,
}

impl fmt::Debug for TemporaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemporaryCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

/// Obtains temporary credentials in a monitored account.
#[async_trait]
pub trait CrossAccountAccess: Send + Sync {
    /// Assumes `role_arn`, presenting `external_id` to the role's trust policy.
    ///
    /// # Returns
    /// * `Ok(TemporaryCredentials)` scoped to the assumed role
    /// * `Err` when the request is denied, the trust is broken, or the call fails
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        external_id: &str,
    ) -> Result<TemporaryCredentials>;
}

/// Parameters of a single audit trail lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupQuery {
    pub event_source: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub max_results: i32,
}

/// Queries an account's audit trail.
#[async_trait]
pub trait AuditTrail: Send + Sync {
    /// Returns at most `query.max_results` records in the query window, in
    /// the order the trail reports them.
    async fn lookup_events(
        &self,
        credentials: &TemporaryCredentials,
        query: &LookupQuery,
    ) -> Result<Vec<AuditRecord>>;
}

/// Publishes a message to a notification topic.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes `message` to `topic_arn` in `region`.
    ///
    /// # Returns
    /// * `Ok(message_id)` assigned by the transport
    /// * `Err` if the transport rejected or failed the publish
    async fn publish(
        &self,
        region: &str,
        topic_arn: &str,
        subject: &str,
        message: &str,
    ) -> Result<String>;
}
