//! Integration tests for the cross-account poller.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::watch;
use zonewatch::{
    app::App,
    config::{Config, Mode},
    core::AuditRecord,
    lambda,
    notification::test_utils::RecordingPublisher,
    poller::{
        test_utils::{FakeAccess, FakeAuditTrail},
        PollError, PollOutcome, PollState,
    },
};

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::{poller_harness, record, CRITICAL_TOPIC, GENERAL_TOPIC, ROLE_ARN, ZONE_SOURCE};

fn tick_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

fn mixed_records(now: DateTime<Utc>) -> Vec<AuditRecord> {
    let at = |minutes: i64| now - Duration::minutes(minutes);
    vec![
        record(ZONE_SOURCE, "GetHostedZone", at(4)),
        record(ZONE_SOURCE, "CreateHostedZone", at(4)),
        record("ec2.amazonaws.com", "RunInstances", at(4)),
        record(ZONE_SOURCE, "ListHostedZones", at(3)),
        record(ZONE_SOURCE, "ChangeResourceRecordSets", at(3)),
        record("s3.amazonaws.com", "DeleteHostedZone", at(3)),
        record(ZONE_SOURCE, "GetChange", at(2)),
        record("iam.amazonaws.com", "CreateRole", at(2)),
        record(ZONE_SOURCE, "DeleteHostedZone", at(1)),
        record(ZONE_SOURCE, "ListResourceRecordSets", at(1)),
    ]
}

fn published_event_names(messages: &[zonewatch::notification::test_utils::PublishedMessage]) -> Vec<String> {
    messages
        .iter()
        .map(|m| {
            let body: Value = serde_json::from_str(&m.message).unwrap();
            body["eventName"].as_str().unwrap().to_string()
        })
        .collect()
}

#[tokio::test]
async fn test_only_matching_records_are_published_in_order() {
    let now = tick_time();
    let harness = poller_harness(mixed_records(now), 300);

    let report = harness.poller.run_tick(now).await;

    assert!(matches!(report.outcome, PollOutcome::Completed));
    assert_eq!(report.fetched, 10);
    assert_eq!(report.matched, 3);
    assert_eq!(report.published, vec!["msg-1", "msg-2", "msg-3"]);
    assert!(report.failures.is_empty());
    assert_eq!(report.final_state, PollState::Idle);
    assert_eq!(report.window.last_seen_event_time, Some(now - Duration::minutes(1)));

    let published = harness.publisher.published();
    assert_eq!(
        published_event_names(&published),
        vec!["CreateHostedZone", "ChangeResourceRecordSets", "DeleteHostedZone"]
    );
    assert!(published.iter().all(|m| m.topic_arn == GENERAL_TOPIC));
    assert!(published.iter().all(|m| m.region == "us-east-1"));
}

#[tokio::test]
async fn test_pulled_alert_fields() {
    let now = tick_time();
    let change = record(ZONE_SOURCE, "CreateHostedZone", now - Duration::minutes(1));
    let harness = poller_harness(vec![change], 300);

    harness.poller.run_tick(now).await;

    let published = harness.publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].subject, "AUDIT Account Change Alert: CreateHostedZone");
    let body: Value = serde_json::from_str(&published[0].message).unwrap();
    assert_eq!(body["eventTime"], "2024-01-01T11:59:00Z");
    assert_eq!(body["eventSource"], ZONE_SOURCE);
    assert_eq!(body["sourceIPAddress"], "198.51.100.4");
    assert_eq!(body["accountId"], "444455556666");
    assert_eq!(body["userIdentity"]["userName"], "ops");
    assert_eq!(body["requestParameters"]["hostedZoneId"], "Z0123456789");
    assert_eq!(body["responseElements"], "Unknown");
    assert_eq!(body["originLabel"], "AUDIT Account");
}

#[tokio::test]
async fn test_publish_failure_does_not_suppress_later_records() {
    let now = tick_time();
    let harness = poller_harness(mixed_records(now), 300);
    harness.publisher.fail_on_attempts(&[2]);

    let report = harness.poller.run_tick(now).await;

    // A per-record publish failure does not fail the run.
    assert!(matches!(report.outcome, PollOutcome::Completed));
    assert_eq!(harness.publisher.attempts(), 3);
    assert_eq!(report.published, vec!["msg-1", "msg-3"]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 4);
    assert_eq!(report.failures[0].event_name, "ChangeResourceRecordSets");
    assert_eq!(
        published_event_names(&harness.publisher.published()),
        vec!["CreateHostedZone", "DeleteHostedZone"]
    );
}

#[tokio::test]
async fn test_overlapping_windows_publish_the_same_change_twice() {
    let first_tick = tick_time();
    let second_tick = first_tick + Duration::minutes(3);
    let change = record(ZONE_SOURCE, "ChangeResourceRecordSets", first_tick - Duration::minutes(1));
    let harness = poller_harness(vec![change], 300);

    let first = harness.poller.run_tick(first_tick).await;
    let second = harness.poller.run_tick(second_tick).await;

    // Windows are stateless: a change inside both windows is alerted on
    // by both ticks.
    assert_eq!(first.published.len(), 1);
    assert_eq!(second.published.len(), 1);
    let published = harness.publisher.published();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].message, published[1].message);

    let queries = harness.trail.queries();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0].start_time, first_tick - Duration::minutes(5));
    assert_eq!(queries[0].end_time, first_tick);
    assert_eq!(queries[1].start_time, second_tick - Duration::minutes(5));
    assert_eq!(queries[1].end_time, second_tick);
    assert_eq!(queries[0].event_source, ZONE_SOURCE);
    assert_eq!(queries[0].max_results, 50);
}

#[tokio::test]
async fn test_interval_longer_than_lookback_misses_changes() {
    let first_tick = tick_time();
    let second_tick = first_tick + Duration::minutes(10);
    let change = record(ZONE_SOURCE, "DeleteHostedZone", first_tick + Duration::minutes(2));
    let harness = poller_harness(vec![change], 300);

    let first = harness.poller.run_tick(first_tick).await;
    let second = harness.poller.run_tick(second_tick).await;

    assert_eq!(first.fetched, 0);
    assert_eq!(second.fetched, 0);
    assert_eq!(harness.publisher.attempts(), 0);
}

#[tokio::test]
async fn test_assume_role_failure_escalates_without_querying() {
    let now = tick_time();
    let harness = poller_harness(mixed_records(now), 300);
    harness.access.deny("AccessDenied: not authorized to perform sts:AssumeRole");

    let report = harness.poller.run_tick(now).await;

    assert!(report.is_failed());
    match &report.outcome {
        PollOutcome::Failed { stage, error } => {
            assert_eq!(*stage, PollState::AssumingRole);
            assert!(matches!(error, PollError::CredentialAssumption { .. }));
            assert!(error.to_string().contains("AccessDenied"));
        }
        PollOutcome::Completed => panic!("expected a failed run"),
    }
    assert_eq!(report.final_state, PollState::Idle);
    assert_eq!(harness.access.calls(), 1);
    assert!(harness.trail.queries().is_empty());

    let published = harness.publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic_arn, CRITICAL_TOPIC);
    assert_eq!(published[0].region, "us-west-2");
    assert_eq!(published[0].subject, "zonewatch-poller CRITICAL NOTIFICATION");
    assert!(published[0]
        .message
        .starts_with("Lambda function 'zonewatch-poller' critical notification:\n"));
}

#[tokio::test]
async fn test_query_failure_escalates() {
    let now = tick_time();
    let harness = poller_harness(mixed_records(now), 300);
    harness.trail.fail_with("ThrottlingException: Rate exceeded");

    let report = harness.poller.run_tick(now).await;

    match &report.outcome {
        PollOutcome::Failed { stage, error } => {
            assert_eq!(*stage, PollState::Querying);
            assert!(matches!(error, PollError::AuditQuery(_)));
        }
        PollOutcome::Completed => panic!("expected a failed run"),
    }
    assert_eq!(report.fetched, 0);
    assert_eq!(harness.trail.queries().len(), 1);

    let summary = report.summary();
    assert_eq!(summary["status"], "failed");
    assert_eq!(summary["failedStage"], "querying");

    let published = harness.publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic_arn, CRITICAL_TOPIC);
}

#[tokio::test]
async fn test_critical_notification_failure_is_swallowed() {
    let now = tick_time();
    let harness = poller_harness(Vec::new(), 300);
    harness.access.deny("ExpiredToken");
    harness.publisher.fail_next(1);

    let report = harness.poller.run_tick(now).await;

    assert!(report.is_failed());
    assert_eq!(harness.publisher.attempts(), 1);
    assert!(harness.publisher.published().is_empty());
}

fn poll_config() -> Config {
    let mut config = Config::default();
    config.origin_label = "AUDIT Account".to_string();
    config.notification.general_topic = GENERAL_TOPIC.to_string();
    config.poller.role_arn = ROLE_ARN.to_string();
    config.poller.external_id = "ext-1234".to_string();
    config
}

async fn poll_app(
    publisher: &Arc<RecordingPublisher>,
    access: &FakeAccess,
    trail: &FakeAuditTrail,
) -> App {
    App::builder(poll_config())
        .publisher_override(publisher.clone())
        .access_override(Arc::new(access.clone()))
        .trail_override(Arc::new(trail.clone()))
        .build(Mode::Poll)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_lambda_poll_invocation_returns_summary() {
    let publisher = Arc::new(RecordingPublisher::new());
    let access = FakeAccess::new();
    let trail = FakeAuditTrail::with_records(vec![record(
        ZONE_SOURCE,
        "CreateHostedZone",
        Utc::now() - Duration::seconds(30),
    )]);
    let app = poll_app(&publisher, &access, &trail).await;

    let summary = lambda::handle(&app, Mode::Poll, Value::Null).await.unwrap();

    assert_eq!(summary["status"], "completed");
    assert_eq!(summary["fetched"], 1);
    assert_eq!(summary["matched"], 1);
    assert_eq!(summary["published"], serde_json::json!(["msg-1"]));
    assert_eq!(trail.queries()[0].max_results, 10);
}

#[tokio::test]
async fn test_lambda_poll_invocation_succeeds_on_failed_run() {
    let publisher = Arc::new(RecordingPublisher::new());
    let access = FakeAccess::new();
    access.deny("AccessDenied");
    let trail = FakeAuditTrail::new();
    let app = poll_app(&publisher, &access, &trail).await;

    let summary = lambda::handle(&app, Mode::Poll, Value::Null).await.unwrap();

    assert_eq!(summary["status"], "failed");
    assert_eq!(summary["failedStage"], "assuming_role");
    // No critical topic configured: the escalation goes to the general topic.
    let published = harness_subjects(&publisher);
    assert_eq!(published, vec!["zonewatch CRITICAL NOTIFICATION"]);
}

#[tokio::test]
async fn test_poll_loop_stops_on_shutdown() {
    let publisher = Arc::new(RecordingPublisher::new());
    let access = FakeAccess::new();
    let trail = FakeAuditTrail::new();
    let app = poll_app(&publisher, &access, &trail).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(5), app.run_poll_loop(shutdown_rx))
        .await
        .expect("poll loop did not stop")
        .unwrap();
    assert_eq!(access.calls(), 0);
}

fn harness_subjects(publisher: &RecordingPublisher) -> Vec<String> {
    publisher.published().into_iter().map(|m| m.subject).collect()
}

#[tokio::test(start_paused = true)]
async fn test_expired_poll_tick_is_abandoned_and_escalated() {
    let publisher = Arc::new(RecordingPublisher::new());
    let access = FakeAccess::new();
    access.delay_by(std::time::Duration::from_secs(5));
    let trail = FakeAuditTrail::new();
    let mut config = poll_config();
    config.invocation_timeout_seconds = 1;
    let app = App::builder(config)
        .publisher_override(publisher.clone())
        .access_override(Arc::new(access.clone()))
        .trail_override(Arc::new(trail.clone()))
        .build(Mode::Poll)
        .await
        .unwrap();

    let report = app.poll_once().await.unwrap();

    assert!(report.is_none());
    assert!(trail.queries().is_empty());
    let published = publisher.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].subject, "zonewatch CRITICAL NOTIFICATION");
    assert!(published[0].message.contains("Poll tick exceeded"));

    let response = lambda::handle(&app, Mode::Poll, Value::Null).await.unwrap();

    assert_eq!(response, serde_json::json!({ "status": "timed_out" }));
    assert_eq!(harness_subjects(&publisher).len(), 2);
}
