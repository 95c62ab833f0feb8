//! Top-level initialization state machine.
//!
//! [`SdkInitializer`] owns the one piece of shared mutable state in the
//! SDK: the [`InitState`]. Concurrent `initialize()` calls collapse into a
//! single attempt (the first caller spawns it, everyone else attaches to
//! its outcome), and once a terminal state is reached every later call
//! replays the stored result with no network activity and no new metrics.

mod orchestrator;

use chrono::Utc;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::cache::AssetCache;
use crate::config::SdkConfig;
use crate::diagnostics::DiagnosticReport;
use crate::diagnostics::DiagnosticsSink;
use crate::diagnostics::LogSink;
use crate::error::InitError;
use crate::metrics::LifecycleKind;
use crate::metrics::MetricOutcome;
use crate::metrics::MetricsCollector;
use crate::metrics::TaskKind;
use crate::modules::DefaultModuleSet;
use crate::modules::DefaultWebViewRuntime;
use crate::modules::ModuleLifecycle;
use crate::modules::WebViewRuntime;
use crate::store::SdkStore;
use crate::store::StoreError;
use crate::transport::ReqwestTransport;
use crate::transport::Transport;
use crate::transport::TransportError;

/// Externally observable lifecycle of the SDK.
#[derive(Debug, Clone, PartialEq)]
pub enum InitState {
    Uninitialized,
    Initializing,
    Initialized,
    Failed(InitError),
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("store init: {0}")]
    Store(#[from] StoreError),
    #[error("transport init: {0}")]
    Transport(#[from] TransportError),
}

/// Collaborators injected into the initializer. Everything the orchestrator
/// calls out to lives behind one of these handles, so tests can swap any of
/// them for instrumented fakes.
#[derive(Clone)]
pub struct SdkServices {
    pub transport: Arc<dyn Transport>,
    pub store: Arc<SdkStore>,
    pub modules: Arc<dyn ModuleLifecycle>,
    pub runtime: Arc<dyn WebViewRuntime>,
    pub diagnostics: Arc<dyn DiagnosticsSink>,
}

impl SdkServices {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<SdkStore>,
        modules: Arc<dyn ModuleLifecycle>,
        runtime: Arc<dyn WebViewRuntime>,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            transport,
            store,
            modules,
            runtime,
            diagnostics,
        }
    }

    /// Production wiring: reqwest transport, filesystem store rooted at the
    /// given directory, stock module set and runtime, log-backed sink.
    pub fn with_defaults(root: PathBuf) -> Result<Self, BootstrapError> {
        Ok(Self {
            transport: Arc::new(ReqwestTransport::new()?),
            store: Arc::new(SdkStore::open(root)?),
            modules: Arc::new(DefaultModuleSet),
            runtime: Arc::new(DefaultWebViewRuntime),
            diagnostics: Arc::new(LogSink),
        })
    }
}

impl fmt::Debug for SdkServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkServices")
            .field("store_root", &self.store.root())
            .finish()
    }
}

type AttemptOutcome = Option<Result<(), InitError>>;

#[derive(Debug)]
enum AttemptState {
    Idle,
    Running(watch::Receiver<AttemptOutcome>),
    Done(Result<(), InitError>),
}

struct InitializerInner {
    seed: SdkConfig,
    services: SdkServices,
    cache: Arc<AssetCache>,
    state: Mutex<AttemptState>,
}

/// The initialization state machine. Cheap to clone; every clone shares the
/// same state and in-flight attempt.
#[derive(Clone)]
pub struct SdkInitializer {
    inner: Arc<InitializerInner>,
}

impl SdkInitializer {
    pub fn new(seed: SdkConfig, services: SdkServices) -> Self {
        let cache = Arc::new(AssetCache::new(services.store.clone()));
        Self {
            inner: Arc::new(InitializerInner {
                seed,
                services,
                cache,
                state: Mutex::new(AttemptState::Idle),
            }),
        }
    }

    pub fn with_defaults(seed: SdkConfig, root: PathBuf) -> Result<Self, BootstrapError> {
        Ok(Self::new(seed, SdkServices::with_defaults(root)?))
    }

    pub fn state(&self) -> InitState {
        if let Ok(state) = self.inner.state.lock() {
            match &*state {
                AttemptState::Idle => InitState::Uninitialized,
                AttemptState::Running(_) => InitState::Initializing,
                AttemptState::Done(Ok(())) => InitState::Initialized,
                AttemptState::Done(Err(error)) => InitState::Failed(error.clone()),
            }
        } else {
            InitState::Uninitialized
        }
    }

    /// Run (or attach to, or replay) the initialization attempt.
    ///
    /// Idempotent under concurrency: while an attempt is in flight every
    /// caller awaits the same outcome, and once a terminal state is stored
    /// it is returned immediately with no further side effects.
    pub async fn initialize(&self) -> Result<(), InitError> {
        let mut rx = {
            let Ok(mut state) = self.inner.state.lock() else {
                return Err(InitError::Aborted);
            };
            match &*state {
                AttemptState::Done(result) => return result.clone(),
                AttemptState::Running(rx) => rx.clone(),
                AttemptState::Idle => {
                    let (tx, rx) = watch::channel(None);
                    *state = AttemptState::Running(rx.clone());
                    tokio::spawn(run_attempt(self.inner.clone(), tx));
                    rx
                }
            }
        };
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Err(InitError::Aborted)),
            Err(_) => Err(InitError::Aborted),
        }
    }
}

impl fmt::Debug for SdkInitializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkInitializer")
            .field("state", &self.state())
            .finish()
    }
}

async fn run_attempt(inner: Arc<InitializerInner>, tx: watch::Sender<AttemptOutcome>) {
    let attempt_id = Uuid::new_v4();
    let started_at = Utc::now();
    let started = Instant::now();
    info!(%attempt_id, "sdk initialization started");

    let metrics = Arc::new(MetricsCollector::new());
    metrics.record_lifecycle(LifecycleKind::InitStarted);

    let ctx = Arc::new(orchestrator::StageContext {
        transport: inner.services.transport.clone(),
        store: inner.services.store.clone(),
        cache: inner.cache.clone(),
        modules: inner.services.modules.clone(),
        runtime: inner.services.runtime.clone(),
        metrics: metrics.clone(),
        cancel: CancellationToken::new(),
        seed: inner.seed.clone(),
    });
    let result = orchestrator::run(ctx).await;
    metrics.record_task(TaskKind::Initializer, MetricOutcome::from_result(&result), started);

    let report = DiagnosticReport {
        attempt_id,
        started_at,
        finished_at: Utc::now(),
        success: result.is_ok(),
        error: result.as_ref().err().map(ToString::to_string),
        events: metrics.flush_once().unwrap_or_default(),
    };
    inner.services.diagnostics.deliver(report);

    match &result {
        Ok(()) => info!(
            %attempt_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sdk initialized"
        ),
        Err(error) => warn!(%attempt_id, "sdk initialization failed: {error}"),
    }

    // A terminal state, once stored, is never overwritten.
    if let Ok(mut state) = inner.state.lock() {
        if !matches!(&*state, AttemptState::Done(_)) {
            *state = AttemptState::Done(result.clone());
        }
    }
    let _ = tx.send(Some(result));
}
