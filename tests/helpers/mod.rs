//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use zonewatch::{
    core::AuditRecord,
    matching::MatchRule,
    notification::{test_utils::RecordingPublisher, ChannelSet, Dispatcher, NotificationChannel, Severity},
    poller::{
        test_utils::{FakeAccess, FakeAuditTrail},
        CrossAccountPoller, PollerSettings,
    },
};

pub const GENERAL_TOPIC: &str = "arn:aws:sns:us-east-1:123456789012:zone-alerts";
pub const CRITICAL_TOPIC: &str = "arn:aws:sns:us-west-2:123456789012:zone-critical";
pub const ROLE_ARN: &str = "arn:aws:iam::444455556666:role/zone-audit";
pub const ZONE_SOURCE: &str = "route53.amazonaws.com";

pub fn channels() -> ChannelSet {
    ChannelSet {
        general: NotificationChannel::new(GENERAL_TOPIC, Severity::General),
        critical: Some(NotificationChannel::new(CRITICAL_TOPIC, Severity::Critical)),
    }
}

pub fn dispatcher(publisher: &Arc<RecordingPublisher>) -> Arc<Dispatcher> {
    Arc::new(Dispatcher::new(publisher.clone(), channels()))
}

pub fn settings(lookback_seconds: u64) -> PollerSettings {
    PollerSettings {
        role_arn: ROLE_ARN.to_string(),
        external_id: "ext-1234".to_string(),
        session_name: "zonewatch-test".to_string(),
        event_source_filter: ZONE_SOURCE.to_string(),
        lookback: std::time::Duration::from_secs(lookback_seconds),
        max_results: 50,
    }
}

/// A poller wired to fresh doubles.
pub struct PollerHarness {
    pub publisher: Arc<RecordingPublisher>,
    pub access: FakeAccess,
    pub trail: FakeAuditTrail,
    pub poller: CrossAccountPoller,
}

pub fn poller_harness(records: Vec<AuditRecord>, lookback_seconds: u64) -> PollerHarness {
    let publisher = Arc::new(RecordingPublisher::new());
    let access = FakeAccess::new();
    let trail = FakeAuditTrail::with_records(records);
    let poller = CrossAccountPoller::new(
        Arc::new(access.clone()),
        Arc::new(trail.clone()),
        dispatcher(&publisher),
        MatchRule::zone_changes(),
        "AUDIT Account",
        "zonewatch-poller",
        settings(lookback_seconds),
    );
    PollerHarness {
        publisher,
        access,
        trail,
        poller,
    }
}

/// An audit record as CloudTrail returns it.
pub fn record(source: &str, name: &str, time: DateTime<Utc>) -> AuditRecord {
    let blob = json!({
        "eventSource": source,
        "eventName": name,
        "eventTime": time.to_rfc3339(),
        "sourceIPAddress": "198.51.100.4",
        "userIdentity": { "type": "IAMUser", "userName": "ops" },
        "requestParameters": { "hostedZoneId": "Z0123456789" },
        "recipientAccountId": "444455556666"
    })
    .to_string();
    AuditRecord {
        event_name: Some(name.to_string()),
        event_time: Some(time),
        event_source: Some(source.to_string()),
        ..Default::default()
    }
    .with_serialized_event(Some(&blob))
}

/// A push envelope as the event bus delivers it.
pub fn envelope(source: &str, name: &str) -> Value {
    json!({
        "version": "0",
        "detail-type": "AWS API Call via CloudTrail",
        "source": "aws.route53",
        "account": "111122223333",
        "time": "2024-01-01T00:00:00Z",
        "region": "us-east-1",
        "detail": {
            "eventSource": source,
            "eventName": name,
            "sourceIPAddress": "203.0.113.10",
            "userIdentity": { "type": "AssumedRole" },
            "requestParameters": { "name": "example.com." },
            "responseElements": null
        }
    })
}
