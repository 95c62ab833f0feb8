mod common;

use assert_matches::assert_matches;
use async_trait::async_trait;
use common::*;
use ignite_core::CachedAsset;
use ignite_core::InitError;
use ignite_core::InitState;
use ignite_core::MetricOutcome;
use ignite_core::RequestKind;
use ignite_core::TaskKind;
use ignite_core::modules::DefaultModuleSet;
use ignite_core::modules::ModuleError;
use ignite_core::modules::ModuleLifecycle;
use ignite_core::modules::RuntimeError;
use ignite_core::modules::WebViewRuntime;
use ignite_core::sha256_hex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use wiremock::ResponseTemplate;

#[tokio::test(flavor = "multi_thread")]
async fn privacy_fatal_code_aborts_before_any_config_request() {
    let harness = Harness::new().await;
    mount_privacy(&harness.server, ResponseTemplate::new(423), 1).await;
    mount_config(&harness.server, ResponseTemplate::new(200), 0).await;
    mount_webview(&harness.server, &webview_bytes(), 0).await;

    let error = harness.initializer.initialize().await.expect_err("denied caller");
    assert_eq!(error, InitError::PrivacyDenied { code: 423 });
    assert_eq!(harness.initializer.state(), InitState::Failed(error));

    let report = harness.single_report();
    assert!(!report.success);
    assert_task(&report, TaskKind::LoadLocalConfig, MetricOutcome::Success);
    assert_task(&report, TaskKind::PrivacyFetch, MetricOutcome::Failure);
    assert_task(&report, TaskKind::InitModules, MetricOutcome::Success);
    assert_task(&report, TaskKind::Reset, MetricOutcome::Success);
    assert_task(&report, TaskKind::Initializer, MetricOutcome::Failure);
    assert_no_task(&report, TaskKind::ConfigFetch);
    assert_no_task(&report, TaskKind::WebViewDownload);
    assert!(request_events(&report).contains(&(RequestKind::Privacy, MetricOutcome::Failure, 1)));
}

#[tokio::test(flavor = "multi_thread")]
async fn privacy_server_error_is_tolerated() {
    let harness = Harness::new().await;
    let bytes = webview_bytes();
    mount_privacy(&harness.server, ResponseTemplate::new(500), 1).await;
    mount_config(
        &harness.server,
        ResponseTemplate::new(200).set_body_json(config_payload(&harness.server.uri(), &bytes)),
        1,
    )
    .await;
    mount_webview(&harness.server, &bytes, 1).await;

    harness.initializer.initialize().await.expect("privacy is best-effort");
    let report = harness.single_report();
    assert_task(&report, TaskKind::PrivacyFetch, MetricOutcome::Success);
    assert!(request_events(&report).contains(&(RequestKind::Privacy, MetricOutcome::Failure, 1)));
    assert_task(&report, TaskKind::Initializer, MetricOutcome::Success);
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_config_payload_is_fatal_even_when_the_download_succeeds() {
    let harness = Harness::new().await;
    let bytes = webview_bytes();
    // Privacy carries fallback web view fields, so the download runs in
    // parallel with the config fetch and finishes first thanks to the
    // response delay below.
    let fallback = serde_json::json!({
        "url": format!("{}{WEBVIEW_PATH}", harness.server.uri()),
        "hash": sha256_hex(&bytes),
    });
    mount_privacy(&harness.server, ResponseTemplate::new(200).set_body_json(fallback), 1).await;
    mount_config(
        &harness.server,
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({"key": "value"}))
            .set_delay(Duration::from_millis(200)),
        1,
    )
    .await;
    mount_webview(&harness.server, &bytes, 1).await;

    let error = harness.initializer.initialize().await.expect_err("corrupt payload");
    assert_matches!(error, InitError::Parse(_));

    let report = harness.single_report();
    assert_task(&report, TaskKind::ConfigFetch, MetricOutcome::Failure);
    assert_task(&report, TaskKind::WebViewDownload, MetricOutcome::Success);
    assert_task(&report, TaskKind::Initializer, MetricOutcome::Failure);
    assert!(request_events(&report).contains(&(RequestKind::Config, MetricOutcome::Failure, 1)));
}

#[tokio::test(flavor = "multi_thread")]
async fn config_retry_exhaustion_without_cache_is_fatal() {
    let harness = Harness::new().await;
    mount_privacy(
        &harness.server,
        ResponseTemplate::new(200).set_body_json(consent_payload()),
        1,
    )
    .await;
    // max_retries = 2 in the harness seed: three requests total.
    mount_config(&harness.server, ResponseTemplate::new(500), 3).await;

    let error = harness.initializer.initialize().await.expect_err("exhausted retries");
    assert_eq!(error, InitError::Server { status: 500 });
    assert_eq!(harness.initializer.state(), InitState::Failed(error));

    let report = harness.single_report();
    assert_task(&report, TaskKind::ConfigFetch, MetricOutcome::Failure);
    assert_task(&report, TaskKind::Initializer, MetricOutcome::Failure);
    assert!(request_events(&report).contains(&(RequestKind::Config, MetricOutcome::Failure, 3)));
}

#[tokio::test(flavor = "multi_thread")]
async fn downloaded_file_failing_validation_is_fatal() {
    let harness = Harness::new().await;
    let bytes = webview_bytes();
    mount_privacy(
        &harness.server,
        ResponseTemplate::new(200).set_body_json(consent_payload()),
        1,
    )
    .await;
    mount_config(
        &harness.server,
        ResponseTemplate::new(200).set_body_json(config_payload(&harness.server.uri(), &bytes)),
        1,
    )
    .await;
    // The served bytes do not hash to the expected value.
    mount_webview(&harness.server, b"tampered payload", 1).await;

    let error = harness.initializer.initialize().await.expect_err("invalid file");
    assert_matches!(error, InitError::InvalidFile { url } if url.ends_with(WEBVIEW_PATH));

    let report = harness.single_report();
    assert_task(&report, TaskKind::WebViewDownload, MetricOutcome::Failure);
    assert_no_task(&report, TaskKind::WebViewCreate);
    assert_task(&report, TaskKind::Initializer, MetricOutcome::Failure);
}

#[tokio::test(flavor = "multi_thread")]
async fn web_view_fetch_exhaustion_is_fatal() {
    let harness = Harness::new().await;
    let bytes = webview_bytes();
    mount_privacy(
        &harness.server,
        ResponseTemplate::new(200).set_body_json(consent_payload()),
        1,
    )
    .await;
    mount_config(
        &harness.server,
        ResponseTemplate::new(200).set_body_json(config_payload(&harness.server.uri(), &bytes)),
        1,
    )
    .await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path(WEBVIEW_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&harness.server)
        .await;

    let error = harness.initializer.initialize().await.expect_err("download failed");
    assert_eq!(error, InitError::Server { status: 500 });

    let report = harness.single_report();
    assert_task(&report, TaskKind::WebViewDownload, MetricOutcome::Failure);
    assert_task(&report, TaskKind::Initializer, MetricOutcome::Failure);
}

#[tokio::test(flavor = "multi_thread")]
async fn no_source_with_a_usable_url_fails_resolution() {
    let harness = Harness::new().await;
    mount_privacy(
        &harness.server,
        ResponseTemplate::new(200).set_body_json(serde_json::json!({"url": ""})),
        1,
    )
    .await;
    mount_config(
        &harness.server,
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({"url": "not_valid", "hash": "abc"})),
        1,
    )
    .await;

    let error = harness.initializer.initialize().await.expect_err("no usable source");
    assert_eq!(error, InitError::NoWebViewSource);

    let report = harness.single_report();
    assert_task(&report, TaskKind::WebViewDownload, MetricOutcome::Failure);
    assert_task(&report, TaskKind::Initializer, MetricOutcome::Failure);
}

#[derive(Debug)]
struct RejectingRuntime;

#[async_trait]
impl WebViewRuntime for RejectingRuntime {
    async fn create(&self, _asset: &CachedAsset) -> Result<(), RuntimeError> {
        Err(RuntimeError("bridge rejected the bundle".to_string()))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn web_view_create_failure_is_fatal() {
    let harness =
        Harness::with_collaborators(Arc::new(DefaultModuleSet), Arc::new(RejectingRuntime)).await;
    let bytes = webview_bytes();
    mount_privacy(
        &harness.server,
        ResponseTemplate::new(200).set_body_json(consent_payload()),
        1,
    )
    .await;
    mount_config(
        &harness.server,
        ResponseTemplate::new(200).set_body_json(config_payload(&harness.server.uri(), &bytes)),
        1,
    )
    .await;
    mount_webview(&harness.server, &bytes, 1).await;

    let error = harness.initializer.initialize().await.expect_err("runtime failure");
    assert_matches!(error, InitError::Runtime(_));

    let report = harness.single_report();
    assert_task(&report, TaskKind::WebViewDownload, MetricOutcome::Success);
    assert_task(&report, TaskKind::WebViewCreate, MetricOutcome::Failure);
    assert_no_task(&report, TaskKind::Complete);
    assert_task(&report, TaskKind::Initializer, MetricOutcome::Failure);
}

#[derive(Debug)]
struct BrokenModules;

#[async_trait]
impl ModuleLifecycle for BrokenModules {
    async fn init_modules(&self) -> Result<(), ModuleError> {
        Err(ModuleError {
            module: "banner".to_string(),
            reason: "storage unavailable".to_string(),
        })
    }

    async fn reset(&self) -> Result<(), ModuleError> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn module_init_failure_is_fatal() {
    let harness = Harness::with_collaborators(
        Arc::new(BrokenModules),
        Arc::new(ignite_core::modules::DefaultWebViewRuntime),
    )
    .await;
    let bytes = webview_bytes();
    mount_privacy(
        &harness.server,
        ResponseTemplate::new(200).set_body_json(consent_payload()),
        1,
    )
    .await;
    mount_config(
        &harness.server,
        ResponseTemplate::new(200).set_body_json(config_payload(&harness.server.uri(), &bytes)),
        1,
    )
    .await;
    mount_webview(&harness.server, &bytes, 1).await;

    let error = harness.initializer.initialize().await.expect_err("module failure");
    assert_matches!(error, InitError::Module { ref module, .. } if module == "banner");

    let report = harness.single_report();
    assert_task(&report, TaskKind::InitModules, MetricOutcome::Failure);
    assert_task(&report, TaskKind::Reset, MetricOutcome::Success);
    assert_task(&report, TaskKind::Initializer, MetricOutcome::Failure);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_state_replays_the_stored_error_without_network() {
    let harness = Harness::new().await;
    mount_privacy(&harness.server, ResponseTemplate::new(423), 1).await;
    mount_config(&harness.server, ResponseTemplate::new(200), 0).await;

    let first = harness.initializer.initialize().await.expect_err("denied caller");
    for _ in 0..4 {
        let replayed = harness.initializer.initialize().await.expect_err("replayed");
        assert_eq!(replayed, first);
    }
    // Replays do not run new attempts: one report, one privacy request.
    assert_eq!(harness.sink.reports().len(), 1);
}
