//! Append-only metric sink shared by every stage of one initialization
//! attempt.
//!
//! Events are recorded in completion order across concurrently running
//! stages; the collector is flushed exactly once per attempt, after the
//! terminal state transition, into a [`crate::diagnostics::DiagnosticReport`].

use serde::Serialize;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricOutcome {
    Success,
    Failure,
}

impl MetricOutcome {
    pub fn from_result<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            MetricOutcome::Success
        } else {
            MetricOutcome::Failure
        }
    }
}

/// Lifecycle markers outside the per-stage performance events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    InitStarted,
}

/// Work performed while preparing a request, before it hits the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemKind {
    InfoCollection,
    Compression,
}

/// Logical network request whose terminal outcome is reported once,
/// regardless of how many retries it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Privacy,
    Config,
}

/// One stage of the initialization task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Initializer,
    LoadLocalConfig,
    PrivacyFetch,
    ConfigFetch,
    WebViewDownload,
    WebViewCreate,
    InitModules,
    Reset,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum MetricEvent {
    Lifecycle {
        name: LifecycleKind,
    },
    SystemPerformance {
        name: SystemKind,
        outcome: MetricOutcome,
    },
    RequestPerformance {
        endpoint: RequestKind,
        outcome: MetricOutcome,
        attempts: u32,
        duration_ms: u64,
    },
    TaskPerformance {
        task: TaskKind,
        outcome: MetricOutcome,
        duration_ms: u64,
    },
}

/// Thread-safe, append-only event sink for one attempt.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    events: Mutex<Vec<MetricEvent>>,
    flushed: AtomicBool,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event. Events arriving after the flush are dropped; the
    /// report for the attempt is already sealed at that point.
    pub fn record(&self, event: MetricEvent) {
        if self.flushed.load(Ordering::Acquire) {
            return;
        }
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn record_lifecycle(&self, name: LifecycleKind) {
        self.record(MetricEvent::Lifecycle { name });
    }

    pub fn record_system(&self, name: SystemKind, outcome: MetricOutcome) {
        self.record(MetricEvent::SystemPerformance { name, outcome });
    }

    pub fn record_request(
        &self,
        endpoint: RequestKind,
        outcome: MetricOutcome,
        attempts: u32,
        started: Instant,
    ) {
        self.record(MetricEvent::RequestPerformance {
            endpoint,
            outcome,
            attempts,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    pub fn record_task(&self, task: TaskKind, outcome: MetricOutcome, started: Instant) {
        self.record(MetricEvent::TaskPerformance {
            task,
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    /// One-shot drain. The first call returns every event recorded so far,
    /// in completion order; later calls return `None`.
    pub fn flush_once(&self) -> Option<Vec<MetricEvent>> {
        if self.flushed.swap(true, Ordering::AcqRel) {
            return None;
        }
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .ok()
    }
}
