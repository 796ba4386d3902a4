// src/formatting.rs

use crate::core::Alert;
use crate::notification::channel::Severity;

/// SNS rejects subjects longer than this many characters.
pub const MAX_SUBJECT_LEN: usize = 100;

/// A trait for rendering an alert into a message subject and body.
pub trait AlertFormatter: Send + Sync {
    fn subject(&self, alert: &Alert) -> String;
    fn body(&self, alert: &Alert) -> String;
}

/// Renders change alerts as `"<origin> Change Alert: <event>"` with the
/// alert itself as pretty-printed JSON.
pub struct ChangeAlertFormatter;

impl AlertFormatter for ChangeAlertFormatter {
    fn subject(&self, alert: &Alert) -> String {
        clamp_subject(format!(
            "{} Change Alert: {}",
            alert.origin_label, alert.event_name
        ))
    }

    fn body(&self, alert: &Alert) -> String {
        serde_json::to_string_pretty(alert).unwrap_or_else(|_| format!("{:?}", alert))
    }
}

/// Builds the subject and body of a self-monitoring notification.
pub fn self_notification(severity: Severity, function_label: &str, text: &str) -> (String, String) {
    let subject = clamp_subject(format!("{} {} NOTIFICATION", function_label, severity));
    let body = format!(
        "Lambda function '{}' {} notification:\n{}",
        function_label,
        severity.as_lowercase(),
        text
    );
    (subject, body)
}

/// Subjects must be a single line of at most `MAX_SUBJECT_LEN` characters.
fn clamp_subject(subject: String) -> String {
    let single_line: String = subject
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if single_line.chars().count() <= MAX_SUBJECT_LEN {
        single_line
    } else {
        single_line.chars().take(MAX_SUBJECT_LEN).collect()
    }
}
