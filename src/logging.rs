//! Log initialization.

use crate::config::LogFormat;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `level`. Returns silently if a subscriber
/// is already installed (e.g. by a test harness).
pub fn init(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let _ = match format {
        LogFormat::Text => builder.try_init(),
        // One JSON object per line, as CloudWatch Logs expects.
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    };
}
