//! An `AuditTrail` backed by CloudTrail `LookupEvents`.

use crate::core::{AuditRecord, AuditTrail, LookupQuery, TemporaryCredentials};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::{provider::SharedCredentialsProvider, Credentials};
use aws_sdk_cloudtrail::error::DisplayErrorContext;
use aws_sdk_cloudtrail::primitives::DateTime as SmithyDateTime;
use aws_sdk_cloudtrail::types::{Event, LookupAttribute, LookupAttributeKey};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

/// Looks up events in the monitored account's trail using assumed credentials.
pub struct CloudTrailAudit {
    region: String,
}

impl CloudTrailAudit {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
        }
    }

    fn client(&self, credentials: &TemporaryCredentials) -> aws_sdk_cloudtrail::Client {
        let creds = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            Some(credentials.session_token.clone()),
            credentials.expiration.map(std::time::SystemTime::from),
            "AssumedRole",
        );
        let config = SdkConfig::builder()
            .credentials_provider(SharedCredentialsProvider::new(creds))
            .region(Region::new(self.region.clone()))
            .behavior_version(BehaviorVersion::latest())
            .build();
        aws_sdk_cloudtrail::Client::new(&config)
    }
}

#[async_trait]
impl AuditTrail for CloudTrailAudit {
    #[instrument(skip(self, credentials), fields(region = %self.region))]
    async fn lookup_events(
        &self,
        credentials: &TemporaryCredentials,
        query: &LookupQuery,
    ) -> Result<Vec<AuditRecord>> {
        let attribute = LookupAttribute::builder()
            .attribute_key(LookupAttributeKey::EventSource)
            .attribute_value(&query.event_source)
            .build()
            .context("invalid lookup attribute")?;

        let response = self
            .client(credentials)
            .lookup_events()
            .lookup_attributes(attribute)
            .start_time(to_smithy(query.start_time))
            .end_time(to_smithy(query.end_time))
            .max_results(query.max_results)
            .send()
            .await
            .map_err(|e| anyhow!("LookupEvents failed: {}", DisplayErrorContext(&e)))?;

        let records: Vec<AuditRecord> = response.events().iter().map(to_record).collect();
        debug!(count = records.len(), "CloudTrail lookup returned events.");
        Ok(records)
    }
}

fn to_smithy(time: DateTime<Utc>) -> SmithyDateTime {
    SmithyDateTime::from_secs_and_nanos(time.timestamp(), time.timestamp_subsec_nanos())
}

fn to_record(event: &Event) -> AuditRecord {
    let record = AuditRecord {
        event_name: event.event_name().map(str::to_string),
        event_time: event
            .event_time()
            .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
        event_source: event.event_source().map(str::to_string),
        ..Default::default()
    }
    .with_serialized_event(event.cloud_trail_event());

    // CloudTrail only reports the caller address inside the serialized event.
    let source_ip_address = record
        .detail("sourceIPAddress")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    AuditRecord {
        source_ip_address,
        ..record
    }
}
