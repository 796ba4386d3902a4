//! Serves the relay and the poller under the AWS Lambda runtime.

use crate::app::App;
use crate::config::Mode;
use crate::internal_metrics::SnapshotLogger;
use crate::relay::RelayOutcome;
use lambda_runtime::{service_fn, Error, LambdaEvent};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

/// Handles one invocation in `mode`.
///
/// Push invocations fail when the alert could not be published, so the
/// delivery layer can retry. Poll invocations always succeed and return the
/// tick's report.
pub async fn handle(app: &App, mode: Mode, event: Value) -> Result<Value, Error> {
    match mode {
        Mode::Push => match app.relay_event(event).await {
            Ok(RelayOutcome::Published { message_id }) => {
                info!(%message_id, "Relay invocation succeeded.");
                Ok(json!({ "statusCode": 200, "body": "Success" }))
            }
            Ok(RelayOutcome::Skipped) => Ok(json!({ "statusCode": 200, "body": "Skipped" })),
            Err(e) => {
                error!("Relay invocation failed: {:#}", e);
                Err(e.into())
            }
        },
        Mode::Poll => match app.poll_once().await? {
            Some(report) => Ok(report.summary()),
            None => Ok(json!({ "status": "timed_out" })),
        },
    }
}

/// Runs the Lambda event loop until the runtime shuts the process down.
pub async fn serve(app: Arc<App>, mode: Mode, snapshot: Option<SnapshotLogger>) -> Result<(), Error> {
    info!(?mode, "Starting Lambda runtime.");
    let func = service_fn(move |event: LambdaEvent<Value>| {
        let app = app.clone();
        let snapshot = snapshot.clone();
        async move {
            let (payload, _context) = event.into_parts();
            let result = handle(&app, mode, payload).await;
            if let Some(snapshot) = &snapshot {
                snapshot.log_snapshot();
            }
            result
        }
    });
    lambda_runtime::run(func).await
}
