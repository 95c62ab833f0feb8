//! The fetch graph of one initialization attempt.
//!
//! Stage layout: the cached configuration loads first and seeds the
//! descriptor slot; the web-asset download, module init and reset tasks
//! are spawned immediately; privacy runs next and the config fetch only
//! starts once privacy has completed, because its request body embeds the
//! consent state and a fatally denied caller must produce zero config
//! requests. The first fatal stage failure cancels the remaining work, but
//! every spawned stage is joined before the attempt reports so its events
//! land inside this attempt's diagnostic report.

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::cache::AssetCache;
use crate::cache::CachedAsset;
use crate::cache::sha256_hex;
use crate::config;
use crate::config::DescriptorSlot;
use crate::config::DescriptorSource;
use crate::config::RemoteConfig;
use crate::config::SdkConfig;
use crate::config::SlotState;
use crate::config::WebViewDescriptor;
use crate::error::InitError;
use crate::metrics::MetricOutcome;
use crate::metrics::MetricsCollector;
use crate::metrics::RequestKind;
use crate::metrics::SystemKind;
use crate::metrics::TaskKind;
use crate::modules::ModuleLifecycle;
use crate::modules::WebViewRuntime;
use crate::privacy;
use crate::privacy::PrivacyResponse;
use crate::retry::RetryPolicy;
use crate::retry::with_retry;
use crate::store::SdkStore;
use crate::transport::HttpRequest;
use crate::transport::Transport;

pub(crate) struct StageContext {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) store: Arc<SdkStore>,
    pub(crate) cache: Arc<AssetCache>,
    pub(crate) modules: Arc<dyn ModuleLifecycle>,
    pub(crate) runtime: Arc<dyn WebViewRuntime>,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) cancel: CancellationToken,
    pub(crate) seed: SdkConfig,
}

pub(crate) async fn run(ctx: Arc<StageContext>) -> Result<(), InitError> {
    let slot = Arc::new(DescriptorSlot::new());

    let load_started = Instant::now();
    let cached = ctx.store.load_config().unwrap_or_else(|err| {
        warn!("cached configuration unavailable: {err}");
        None
    });
    ctx.metrics
        .record_task(TaskKind::LoadLocalConfig, MetricOutcome::Success, load_started);
    let has_cached = cached.is_some();
    let baseline = cached.unwrap_or_else(|| ctx.seed.clone());
    slot.offer(DescriptorSource::Baseline, baseline.usable_web_view());

    let download = tokio::spawn(web_view_stage(
        ctx.clone(),
        slot.clone(),
        RetryPolicy::new(baseline.web_view_retry),
    ));
    let modules = tokio::spawn(module_stage(ctx.clone()));
    let reset = tokio::spawn(reset_stage(ctx.clone()));

    let fetched = fetch_stages(&ctx, &slot, has_cached, &baseline).await;
    if fetched.is_err() {
        ctx.cancel.cancel();
    }
    let download_result = download.await.map_err(|_| InitError::Aborted);
    let modules_result = modules.await.map_err(|_| InitError::Aborted).and_then(|r| r);
    let reset_result = reset.await.map_err(|_| InitError::Aborted).and_then(|r| r);

    let (privacy, fetched) = fetched?;
    let (descriptor, asset) = match download_result? {
        Some(result) => result?,
        None => return Err(InitError::Aborted),
    };
    modules_result?;
    reset_result?;

    let mut effective = config::resolve(&baseline, fetched.as_ref(), privacy.as_ref())?;
    // The downloaded asset is the source of truth: the effective descriptor
    // must carry the hash that was actually validated.
    effective.web_view = Some(descriptor);

    let create_started = Instant::now();
    let created = ctx
        .runtime
        .create(&asset)
        .await
        .map_err(|err| InitError::Runtime(err.0));
    ctx.metrics
        .record_task(TaskKind::WebViewCreate, MetricOutcome::from_result(&created), create_started);
    created?;

    let complete_started = Instant::now();
    if let Err(err) = ctx.store.save_config(&effective) {
        warn!("failed to persist resolved configuration: {err}");
    }
    ctx.metrics
        .record_task(TaskKind::Complete, MetricOutcome::Success, complete_started);
    info!(app_id = %effective.app_id, "initialization pipeline complete");
    Ok(())
}

async fn fetch_stages(
    ctx: &StageContext,
    slot: &DescriptorSlot,
    has_cached: bool,
    baseline: &SdkConfig,
) -> Result<(Option<PrivacyResponse>, Option<RemoteConfig>), InitError> {
    let privacy = privacy_stage(ctx, baseline).await?;
    slot.offer(
        DescriptorSource::Privacy,
        privacy.as_ref().and_then(PrivacyResponse::web_view_fallback),
    );
    let fetched = config_stage(ctx, baseline, has_cached, privacy.as_ref()).await;
    slot.offer(
        DescriptorSource::ConfigResponse,
        fetched
            .as_ref()
            .ok()
            .and_then(|remote| remote.as_ref())
            .map(RemoteConfig::web_view_descriptor),
    );
    Ok((privacy, fetched?))
}

/// Single-shot privacy fetch. Only the defined fatal codes fail the stage;
/// every other failure degrades to "no consent data, no fallback fields".
async fn privacy_stage(
    ctx: &StageContext,
    baseline: &SdkConfig,
) -> Result<Option<PrivacyResponse>, InitError> {
    let started = Instant::now();
    let outcome = execute_privacy_request(ctx, baseline).await;
    ctx.metrics
        .record_task(TaskKind::PrivacyFetch, MetricOutcome::from_result(&outcome), started);
    outcome
}

async fn execute_privacy_request(
    ctx: &StageContext,
    baseline: &SdkConfig,
) -> Result<Option<PrivacyResponse>, InitError> {
    let started = Instant::now();
    let body = serde_json::json!({
        "appId": baseline.app_id,
        "sdkVersion": env!("CARGO_PKG_VERSION"),
    });
    let body = match serde_json::to_vec(&body) {
        Ok(bytes) => Bytes::from(bytes),
        Err(err) => return Err(InitError::Transport(format!("privacy request body: {err}"))),
    };
    let request = HttpRequest::post(baseline.privacy_url.clone(), body)
        .header("Content-Type", "application/json");
    let response = match ctx.transport.execute(request).await {
        Ok(response) => response,
        Err(err) => {
            warn!("privacy request failed: {err}");
            ctx.metrics
                .record_request(RequestKind::Privacy, MetricOutcome::Failure, 1, started);
            return Ok(None);
        }
    };
    if let Some(fatal) = privacy::fatal_privacy_error(response.status) {
        ctx.metrics
            .record_request(RequestKind::Privacy, MetricOutcome::Failure, 1, started);
        return Err(fatal);
    }
    if !response.is_success() {
        warn!("privacy endpoint returned status {}", response.status);
        ctx.metrics
            .record_request(RequestKind::Privacy, MetricOutcome::Failure, 1, started);
        return Ok(None);
    }
    ctx.metrics
        .record_request(RequestKind::Privacy, MetricOutcome::Success, 1, started);
    Ok(PrivacyResponse::parse(&response.body))
}

/// Retried config fetch. Transient exhaustion is tolerated when a cached
/// configuration exists; a corrupt payload never is.
async fn config_stage(
    ctx: &StageContext,
    baseline: &SdkConfig,
    has_cached: bool,
    privacy: Option<&PrivacyResponse>,
) -> Result<Option<RemoteConfig>, InitError> {
    let started = Instant::now();
    match execute_config_fetch(ctx, baseline, privacy).await {
        Ok(remote) => {
            ctx.metrics
                .record_task(TaskKind::ConfigFetch, MetricOutcome::Success, started);
            Ok(Some(remote))
        }
        Err(error) => {
            ctx.metrics
                .record_task(TaskKind::ConfigFetch, MetricOutcome::Failure, started);
            if error.is_retryable() && has_cached {
                warn!("config fetch exhausted retries, continuing on cached configuration: {error}");
                Ok(None)
            } else {
                Err(error)
            }
        }
    }
}

async fn execute_config_fetch(
    ctx: &StageContext,
    baseline: &SdkConfig,
    privacy: Option<&PrivacyResponse>,
) -> Result<RemoteConfig, InitError> {
    let body = build_config_body(ctx, baseline, privacy)?;
    let policy = RetryPolicy::new(baseline.config_retry);
    let started = Instant::now();
    let outcome = with_retry(policy, &ctx.cancel, || {
        let request = HttpRequest::post(baseline.config_url.clone(), body.clone())
            .header("Content-Type", "application/json")
            .header("Content-Encoding", "gzip");
        let transport = ctx.transport.clone();
        async move {
            let response = transport
                .execute(request)
                .await
                .map_err(|err| InitError::Transport(err.to_string()))?;
            if !response.is_success() {
                return Err(InitError::Server {
                    status: response.status,
                });
            }
            Ok(response.body)
        }
    })
    .await;
    let result = match outcome.result {
        Ok(bytes) => RemoteConfig::parse(&bytes).map_err(InitError::from),
        Err(error) => Err(error),
    };
    ctx.metrics.record_request(
        RequestKind::Config,
        MetricOutcome::from_result(&result),
        outcome.attempts,
        started,
    );
    result
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigRequestInfo<'a> {
    app_id: &'a str,
    sdk_version: &'static str,
    platform: String,
    os_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    allow_tracking: Option<bool>,
}

fn build_config_body(
    ctx: &StageContext,
    baseline: &SdkConfig,
    privacy: Option<&PrivacyResponse>,
) -> Result<Bytes, InitError> {
    let info = os_info::get();
    let payload = ConfigRequestInfo {
        app_id: &baseline.app_id,
        sdk_version: env!("CARGO_PKG_VERSION"),
        platform: info.os_type().to_string(),
        os_version: info.version().to_string(),
        allow_tracking: privacy.and_then(|response| response.allow_tracking),
    };
    let json = match serde_json::to_vec(&payload) {
        Ok(json) => {
            ctx.metrics
                .record_system(SystemKind::InfoCollection, MetricOutcome::Success);
            json
        }
        Err(err) => {
            ctx.metrics
                .record_system(SystemKind::InfoCollection, MetricOutcome::Failure);
            return Err(InitError::Transport(format!("config request body: {err}")));
        }
    };
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let compressed = match encoder.write_all(&json) {
        Ok(()) => encoder.finish(),
        Err(err) => Err(err),
    };
    match compressed {
        Ok(bytes) => {
            ctx.metrics
                .record_system(SystemKind::Compression, MetricOutcome::Success);
            Ok(Bytes::from(bytes))
        }
        Err(err) => {
            ctx.metrics
                .record_system(SystemKind::Compression, MetricOutcome::Failure);
            Err(InitError::Transport(format!("config request body: {err}")))
        }
    }
}

/// Download stage. Blocks on the descriptor slot, so it may start before
/// or after the privacy/config responses depending on which source
/// resolves first; a cache hit under the expected hash skips the network
/// entirely. Returns `None` when the attempt was abandoned before this
/// stage produced an outcome.
async fn web_view_stage(
    ctx: Arc<StageContext>,
    slot: Arc<DescriptorSlot>,
    policy: RetryPolicy,
) -> Option<Result<(WebViewDescriptor, CachedAsset), InitError>> {
    let state = tokio::select! {
        () = ctx.cancel.cancelled() => return None,
        state = slot.resolved() => state,
    };
    let started = Instant::now();
    let descriptor = match state {
        SlotState::Ready(descriptor) => descriptor,
        SlotState::Pending | SlotState::Exhausted => {
            ctx.metrics
                .record_task(TaskKind::WebViewDownload, MetricOutcome::Failure, started);
            return Some(Err(InitError::NoWebViewSource));
        }
    };
    if let Some(asset) = ctx.cache.lookup(&descriptor.expected_hash) {
        debug!(hash = %asset.hash, "web view asset served from cache");
        ctx.metrics
            .record_task(TaskKind::WebViewDownload, MetricOutcome::Success, started);
        return Some(Ok((descriptor, asset)));
    }
    let result = tokio::select! {
        () = ctx.cancel.cancelled() => return None,
        result = download_asset(&ctx, &descriptor, policy) => result,
    };
    ctx.metrics
        .record_task(TaskKind::WebViewDownload, MetricOutcome::from_result(&result), started);
    Some(result.map(|asset| (descriptor, asset)))
}

async fn download_asset(
    ctx: &StageContext,
    descriptor: &WebViewDescriptor,
    policy: RetryPolicy,
) -> Result<CachedAsset, InitError> {
    // The slot only admits descriptors that passed validation.
    let url = descriptor.validate().map_err(InitError::from)?;
    let outcome = with_retry(policy, &ctx.cancel, || {
        let request = HttpRequest::get(url.as_str());
        let transport = ctx.transport.clone();
        async move {
            let response = transport
                .execute(request)
                .await
                .map_err(|err| InitError::Transport(err.to_string()))?;
            if !response.is_success() {
                return Err(InitError::Server {
                    status: response.status,
                });
            }
            Ok(response.body)
        }
    })
    .await;
    let bytes = outcome.result?;
    if bytes.is_empty() || sha256_hex(&bytes) != descriptor.expected_hash {
        return Err(InitError::InvalidFile {
            url: descriptor.url.clone(),
        });
    }
    let bytes = bytes.to_vec();
    if let Err(err) = ctx.cache.insert(&bytes, &descriptor.expected_hash) {
        warn!("failed to cache downloaded asset: {err}");
    }
    debug!(
        attempts = outcome.attempts,
        hash = %descriptor.expected_hash,
        "web view asset downloaded"
    );
    Ok(CachedAsset {
        hash: descriptor.expected_hash.clone(),
        bytes,
    })
}

async fn module_stage(ctx: Arc<StageContext>) -> Result<(), InitError> {
    let started = Instant::now();
    let result = ctx.modules.init_modules().await.map_err(|err| InitError::Module {
        module: err.module,
        reason: err.reason,
    });
    ctx.metrics
        .record_task(TaskKind::InitModules, MetricOutcome::from_result(&result), started);
    result
}

async fn reset_stage(ctx: Arc<StageContext>) -> Result<(), InitError> {
    let started = Instant::now();
    let result = ctx.modules.reset().await.map_err(|err| InitError::Module {
        module: err.module,
        reason: err.reason,
    });
    ctx.metrics
        .record_task(TaskKind::Reset, MetricOutcome::from_result(&result), started);
    result
}
