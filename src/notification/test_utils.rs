use crate::core::Publisher;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A message accepted by the `RecordingPublisher`.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub message_id: String,
    pub region: String,
    pub topic_arn: String,
    pub subject: String,
    pub message: String,
}

/// Fake publisher that records every accepted message.
///
/// Failures can be scripted either for the next N attempts or for specific
/// attempt numbers (1-based).
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    attempts: Arc<AtomicUsize>,
    fail_next: Arc<AtomicUsize>,
    fail_on_attempts: Arc<Mutex<Vec<usize>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the next `count` publish attempts.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Fails the given attempt numbers, counting from 1.
    pub fn fail_on_attempts(&self, attempts: &[usize]) {
        *self.fail_on_attempts.lock().unwrap() = attempts.to_vec();
    }

    /// Holds every subsequent publish for `delay` before answering.
    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        region: &str,
        topic_arn: &str,
        subject: &str,
        message: &str,
    ) -> anyhow::Result<String> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted || self.fail_on_attempts.lock().unwrap().contains(&attempt) {
            anyhow::bail!("simulated publish failure on attempt {}", attempt);
        }

        let message_id = format!("msg-{}", attempt);
        self.published.lock().unwrap().push(PublishedMessage {
            message_id: message_id.clone(),
            region: region.to_string(),
            topic_arn: topic_arn.to_string(),
            subject: subject.to_string(),
            message: message.to_string(),
        });
        Ok(message_id)
    }
}
