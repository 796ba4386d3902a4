//! Cross-account access through AWS STS `AssumeRole`.

use crate::core::{CrossAccountAccess, TemporaryCredentials};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sts::error::DisplayErrorContext;
use chrono::{DateTime, Utc};
use tracing::{info, instrument};

pub struct StsAccess {
    client: aws_sdk_sts::Client,
}

impl StsAccess {
    pub fn new(shared_config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_sts::Client::new(shared_config),
        }
    }
}

#[async_trait]
impl CrossAccountAccess for StsAccess {
    #[instrument(skip(self, external_id))]
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        external_id: &str,
    ) -> Result<TemporaryCredentials> {
        let response = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .external_id(external_id)
            .send()
            .await
            .map_err(|e| anyhow!("AssumeRole failed: {}", DisplayErrorContext(&e)))?;

        let credentials = response
            .credentials()
            .ok_or_else(|| anyhow!("No credentials returned from AssumeRole"))?;

        let expiration = credentials.expiration();
        let expiration = DateTime::<Utc>::from_timestamp(expiration.secs(), expiration.subsec_nanos());
        info!(?expiration, "Assumed role in monitored account.");

        Ok(TemporaryCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration,
        })
    }
}
