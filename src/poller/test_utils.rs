use crate::core::{AuditRecord, AuditTrail, CrossAccountAccess, LookupQuery, TemporaryCredentials};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Fake cross-account access that hands out fixed credentials.
#[derive(Clone, Default)]
pub struct FakeAccess {
    failure: Arc<Mutex<Option<String>>>,
    calls: Arc<AtomicUsize>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl FakeAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent assume-role call fail with `error`.
    pub fn deny(&self, error: &str) {
        *self.failure.lock().unwrap() = Some(error.to_string());
    }

    /// Holds every subsequent assume-role call for `delay` before answering.
    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CrossAccountAccess for FakeAccess {
    async fn assume_role(
        &self,
        _role_arn: &str,
        session_name: &str,
        _external_id: &str,
    ) -> anyhow::Result<TemporaryCredentials> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failure.lock().unwrap().clone() {
            anyhow::bail!(error);
        }
        Ok(TemporaryCredentials {
            access_key_id: "AKIAFAKE".to_string(),
            secret_access_key: "fake-secret".to_string(),
            session_token: format!("token-{}", session_name),
            expiration: None,
        })
    }
}

/// Fake audit trail holding an in-memory list of records.
///
/// Lookups return the stored records whose event time falls in the query
/// window, capped at `max_results`, in insertion order. Records without an
/// event time are always returned.
#[derive(Clone, Default)]
pub struct FakeAuditTrail {
    records: Arc<Mutex<Vec<AuditRecord>>>,
    failure: Arc<Mutex<Option<String>>>,
    queries: Arc<Mutex<Vec<LookupQuery>>>,
}

impl FakeAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<AuditRecord>) -> Self {
        let trail = Self::default();
        *trail.records.lock().unwrap() = records;
        trail
    }

    /// Makes every subsequent lookup fail with `error`.
    pub fn fail_with(&self, error: &str) {
        *self.failure.lock().unwrap() = Some(error.to_string());
    }

    /// Every query received so far.
    pub fn queries(&self) -> Vec<LookupQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditTrail for FakeAuditTrail {
    async fn lookup_events(
        &self,
        _credentials: &TemporaryCredentials,
        query: &LookupQuery,
    ) -> anyhow::Result<Vec<AuditRecord>> {
        self.queries.lock().unwrap().push(query.clone());
        if let Some(error) = self.failure.lock().unwrap().clone() {
            anyhow::bail!(error);
        }

        let limit = usize::try_from(query.max_results).unwrap_or(0);
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|record| {
                record
                    .event_time
                    .map_or(true, |t| query.start_time <= t && t <= query.end_time)
            })
            .take(limit)
            .cloned()
            .collect())
    }
}
