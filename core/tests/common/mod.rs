#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use tempfile::TempDir;
use tempfile::tempdir;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

use ignite_core::DiagnosticReport;
use ignite_core::DiagnosticsSink;
use ignite_core::MetricEvent;
use ignite_core::MetricOutcome;
use ignite_core::ModuleLifecycle;
use ignite_core::ReqwestTransport;
use ignite_core::RequestKind;
use ignite_core::SdkConfig;
use ignite_core::SdkInitializer;
use ignite_core::SdkServices;
use ignite_core::SdkStore;
use ignite_core::TaskKind;
use ignite_core::WebViewRuntime;
use ignite_core::modules::DefaultModuleSet;
use ignite_core::modules::DefaultWebViewRuntime;
use ignite_core::retry::RetryConfig;
use ignite_core::sha256_hex;

pub const CONFIG_PATH: &str = "/v1/configuration";
pub const CONSENT_PATH: &str = "/v1/consent";
pub const WEBVIEW_PATH: &str = "/webview/bundle";

/// Diagnostics sink that keeps every delivered report for assertions.
#[derive(Debug, Default)]
pub struct CaptureSink {
    reports: Mutex<Vec<DiagnosticReport>>,
}

impl CaptureSink {
    pub fn reports(&self) -> Vec<DiagnosticReport> {
        self.reports.lock().expect("capture sink lock").clone()
    }
}

impl DiagnosticsSink for CaptureSink {
    fn deliver(&self, report: DiagnosticReport) {
        self.reports.lock().expect("capture sink lock").push(report);
    }
}

pub struct Harness {
    pub server: MockServer,
    pub dir: TempDir,
    pub store: Arc<SdkStore>,
    pub sink: Arc<CaptureSink>,
    pub initializer: SdkInitializer,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_collaborators(Arc::new(DefaultModuleSet), Arc::new(DefaultWebViewRuntime)).await
    }

    pub async fn with_collaborators(
        modules: Arc<dyn ModuleLifecycle>,
        runtime: Arc<dyn WebViewRuntime>,
    ) -> Self {
        let server = MockServer::start().await;
        let dir = tempdir().expect("harness tempdir");
        let store = Arc::new(SdkStore::open(dir.path().to_path_buf()).expect("store"));
        let sink = Arc::new(CaptureSink::default());
        let services = SdkServices::new(
            Arc::new(ReqwestTransport::new().expect("transport")),
            store.clone(),
            modules,
            runtime,
            sink.clone(),
        );
        let initializer = SdkInitializer::new(seed_config(&server.uri()), services);
        Self {
            server,
            dir,
            store,
            sink,
            initializer,
        }
    }

    /// The one report the attempt under test must have produced.
    pub fn single_report(&self) -> DiagnosticReport {
        let reports = self.sink.reports();
        assert_eq!(reports.len(), 1, "expected exactly one diagnostic report");
        reports.into_iter().next().expect("report")
    }
}

pub fn seed_config(base: &str) -> SdkConfig {
    let mut config = SdkConfig::for_app("game-1234");
    config.config_url = format!("{base}{CONFIG_PATH}");
    config.privacy_url = format!("{base}{CONSENT_PATH}");
    let fast = RetryConfig {
        max_retries: 2,
        base_delay_ms: 1,
        scaling_factor: 1.0,
    };
    config.config_retry = fast;
    config.web_view_retry = fast;
    config
}

pub fn webview_bytes() -> Vec<u8> {
    b"<html>ignite webview bundle</html>".to_vec()
}

/// Minimal valid config-endpoint payload pointing the web view at the mock
/// server.
pub fn config_payload(base: &str, bytes: &[u8]) -> serde_json::Value {
    serde_json::json!({
        "url": format!("{base}{WEBVIEW_PATH}"),
        "hash": sha256_hex(bytes),
    })
}

pub fn consent_payload() -> serde_json::Value {
    serde_json::json!({
        "allowTracking": true,
        "legalFramework": "gdpr",
    })
}

pub async fn mount_privacy(server: &MockServer, template: ResponseTemplate, expected: u64) {
    Mock::given(method("POST"))
        .and(path(CONSENT_PATH))
        .respond_with(template)
        .expect(expected)
        .mount(server)
        .await;
}

pub async fn mount_config(server: &MockServer, template: ResponseTemplate, expected: u64) {
    Mock::given(method("POST"))
        .and(path(CONFIG_PATH))
        .respond_with(template)
        .expect(expected)
        .mount(server)
        .await;
}

pub async fn mount_webview(server: &MockServer, bytes: &[u8], expected: u64) {
    Mock::given(method("GET"))
        .and(path(WEBVIEW_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes.to_vec()))
        .expect(expected)
        .mount(server)
        .await;
}

pub fn task_events(report: &DiagnosticReport) -> Vec<(TaskKind, MetricOutcome)> {
    report
        .events
        .iter()
        .filter_map(|event| match event {
            MetricEvent::TaskPerformance { task, outcome, .. } => Some((*task, *outcome)),
            _ => None,
        })
        .collect()
}

pub fn request_events(report: &DiagnosticReport) -> Vec<(RequestKind, MetricOutcome, u32)> {
    report
        .events
        .iter()
        .filter_map(|event| match event {
            MetricEvent::RequestPerformance {
                endpoint,
                outcome,
                attempts,
                ..
            } => Some((*endpoint, *outcome, *attempts)),
            _ => None,
        })
        .collect()
}

pub fn assert_task(report: &DiagnosticReport, task: TaskKind, outcome: MetricOutcome) {
    assert!(
        task_events(report).contains(&(task, outcome)),
        "expected {task:?} to finish as {outcome:?}; got {:?}",
        task_events(report)
    );
}

pub fn assert_no_task(report: &DiagnosticReport, task: TaskKind) {
    assert!(
        task_events(report).iter().all(|(kind, _)| *kind != task),
        "expected no {task:?} event; got {:?}",
        task_events(report)
    );
}
