use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;
use tracing::debug;
use tracing::info;
use uuid::Uuid;

use crate::metrics::MetricEvent;

/// The flushed, ordered collection of metric events for one attempt.
///
/// Produced exactly once per attempt, after the terminal state transition,
/// and handed to the [`DiagnosticsSink`] whether the attempt succeeded or
/// failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticReport {
    pub attempt_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub events: Vec<MetricEvent>,
}

/// Receives the per-attempt report for upload or local inspection.
pub trait DiagnosticsSink: Send + Sync {
    fn deliver(&self, report: DiagnosticReport);
}

/// Default sink: summarises the attempt through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticsSink for LogSink {
    fn deliver(&self, report: DiagnosticReport) {
        info!(
            attempt_id = %report.attempt_id,
            success = report.success,
            events = report.events.len(),
            "initialization diagnostic report"
        );
        for event in &report.events {
            debug!(?event, attempt_id = %report.attempt_id, "diagnostic event");
        }
    }
}
