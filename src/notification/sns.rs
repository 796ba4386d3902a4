//! A `Publisher` backed by Amazon SNS.

use crate::core::Publisher;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use aws_config::{Region, SdkConfig};
use aws_sdk_sns::error::DisplayErrorContext;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, error, instrument};

/// Publishes to SNS topics, building one client per delivery region.
pub struct SnsPublisher {
    shared_config: SdkConfig,
    clients: Mutex<HashMap<String, aws_sdk_sns::Client>>,
}

impl SnsPublisher {
    pub fn new(shared_config: SdkConfig) -> Self {
        Self {
            shared_config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, region: &str) -> aws_sdk_sns::Client {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients
            .entry(region.to_string())
            .or_insert_with(|| {
                debug!(region, "Creating SNS client.");
                let config = aws_sdk_sns::config::Builder::from(&self.shared_config)
                    .region(Region::new(region.to_string()))
                    .build();
                aws_sdk_sns::Client::from_conf(config)
            })
            .clone()
    }
}

#[async_trait]
impl Publisher for SnsPublisher {
    #[instrument(skip(self, subject, message))]
    async fn publish(
        &self,
        region: &str,
        topic_arn: &str,
        subject: &str,
        message: &str,
    ) -> Result<String> {
        let output = self
            .client_for(region)
            .publish()
            .topic_arn(topic_arn)
            .subject(subject)
            .message(message)
            .send()
            .await
            .map_err(|e| {
                error!("SNS:Publish to {} failed: {}", topic_arn, DisplayErrorContext(&e));
                anyhow!("SNS:Publish to {} failed: {}", topic_arn, DisplayErrorContext(&e))
            })?;

        let message_id = output
            .message_id()
            .ok_or_else(|| anyhow!("SNS:Publish returned no message id"))?;
        debug!(message_id, "Successfully published to SNS.");
        Ok(message_id.to_string())
    }
}
