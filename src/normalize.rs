//! Builds the canonical `Alert` from either raw event shape.
//!
//! Every lookup is defensive: a missing, `null` or empty field becomes
//! [`UNKNOWN`] and nothing here can fail.

use crate::core::{Alert, AuditRecord, PushEnvelope, RawEvent, UNKNOWN};
use chrono::SecondsFormat;
use serde_json::Value;

/// Normalizes `event` into an alert attributed to `origin_label`.
pub fn normalize(event: &RawEvent, origin_label: &str) -> Alert {
    match event {
        RawEvent::Push(envelope) => from_push(envelope, origin_label),
        RawEvent::Pulled(record) => from_pulled(record, origin_label),
    }
}

fn from_push(envelope: &PushEnvelope, origin_label: &str) -> Alert {
    Alert {
        event_time: text(envelope.time()),
        event_name: text(envelope.detail("eventName")),
        event_source: text(envelope.detail("eventSource")),
        source_ip_address: text(envelope.detail("sourceIPAddress")),
        user_identity: structured(envelope.detail("userIdentity")),
        request_parameters: structured(envelope.detail("requestParameters")),
        response_elements: structured(envelope.detail("responseElements")),
        account_id: text(envelope.account()),
        origin_label: origin_label.to_string(),
    }
}

fn from_pulled(record: &AuditRecord, origin_label: &str) -> Alert {
    let event_time = match record.event_time {
        Some(time) => time.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => text(record.detail("eventTime")),
    };

    Alert {
        event_time,
        event_name: owned_or(record.event_name.as_deref(), record.detail("eventName")),
        event_source: owned_or(record.event_source.as_deref(), record.detail("eventSource")),
        source_ip_address: owned_or(
            record.source_ip_address.as_deref(),
            record.detail("sourceIPAddress"),
        ),
        user_identity: structured(record.detail("userIdentity")),
        request_parameters: structured(record.detail("requestParameters")),
        response_elements: structured(record.detail("responseElements")),
        account_id: owned_or(record.account_id.as_deref(), record.detail("recipientAccountId")),
        origin_label: origin_label.to_string(),
    }
}

/// Prefers the record's own field, falling back to the serialized blob.
fn owned_or(field: Option<&str>, fallback: Option<&Value>) -> String {
    match field {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => text(fallback),
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => UNKNOWN.to_string(),
        Some(Value::String(s)) if s.is_empty() => UNKNOWN.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn structured(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::String(UNKNOWN.to_string()),
        Some(other) => other.clone(),
    }
}
