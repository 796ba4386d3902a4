//! Metric descriptions and the snapshot-logging recorder.
//!
//! Components record through the `metrics` facade. No exporter is bundled:
//! a deployment either installs its own recorder or enables
//! `metrics.log_metrics`, which installs a `LoggingRecorder` whose counters
//! are written to the log after every invocation.

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use metrics_util::registry::{AtomicStorage, Registry};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

/// Registers descriptions for every metric the pipeline records.
pub fn describe_metrics() {
    metrics::describe_counter!("events_received_total", Unit::Count, "Raw events received, labeled by mode.");
    metrics::describe_counter!("events_skipped_total", Unit::Count, "Raw events that did not match the zone change rules, labeled by mode.");
    metrics::describe_counter!("alerts_published_total", Unit::Count, "Alerts accepted by the notification transport, labeled by mode.");
    metrics::describe_counter!("alert_publish_failures_total", Unit::Count, "Alerts that could not be published, labeled by mode.");
    metrics::describe_counter!("poll_runs_total", Unit::Count, "Poll ticks, labeled by outcome.");
    metrics::describe_counter!("self_notifications_total", Unit::Count, "Self-monitoring notifications, labeled by severity and status.");
    metrics::describe_histogram!("poll_tick_duration_seconds", Unit::Seconds, "Time taken by a single poll tick.");
}

/// A recorder that keeps metrics in memory for snapshot logging.
pub struct LoggingRecorder {
    registry: Arc<Registry<Key, AtomicStorage>>,
}

/// A handle that reads the recorder's registry after it is installed.
#[derive(Clone)]
pub struct SnapshotLogger {
    registry: Arc<Registry<Key, AtomicStorage>>,
}

impl LoggingRecorder {
    pub fn new() -> (Self, SnapshotLogger) {
        let registry = Arc::new(Registry::new(AtomicStorage));
        (
            Self {
                registry: registry.clone(),
            },
            SnapshotLogger { registry },
        )
    }

    /// Installs a `LoggingRecorder` as the global recorder.
    pub fn install() -> anyhow::Result<SnapshotLogger> {
        let (recorder, logger) = Self::new();
        metrics::set_global_recorder(recorder)
            .map_err(|e| anyhow::anyhow!("failed to install logging recorder: {}", e))?;
        Ok(logger)
    }
}

impl SnapshotLogger {
    /// Logs every counter and gauge, and the sample count of each histogram.
    pub fn log_snapshot(&self) {
        for (key, counter) in self.registry.get_counter_handles() {
            info!("[Counter] {}: {}", key, counter.load(Ordering::Relaxed));
        }
        for (key, gauge) in self.registry.get_gauge_handles() {
            info!("[Gauge] {}: {}", key, f64::from_bits(gauge.load(Ordering::Relaxed)));
        }
        for (key, histogram) in self.registry.get_histogram_handles() {
            info!("[Histogram] {}: {} samples", key, histogram.data().len());
        }
    }

    /// Sum of a counter across all label sets.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.registry
            .get_counter_handles()
            .into_iter()
            .filter(|(key, _)| key.name() == name)
            .map(|(_, counter)| counter.load(Ordering::Relaxed))
            .sum()
    }
}

impl Recorder for LoggingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        self.registry.get_or_create_counter(key, |c| c.clone()).into()
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        self.registry.get_or_create_gauge(key, |g| g.clone()).into()
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        self.registry.get_or_create_histogram(key, |h| h.clone()).into()
    }
}
