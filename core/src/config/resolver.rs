//! Merges the configuration sources of one attempt into the effective
//! [`SdkConfig`], and feeds the web-asset download stage as soon as any
//! source yields a usable descriptor.

use std::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::config::ConfigError;
use crate::config::RemoteConfig;
use crate::config::SdkConfig;
use crate::config::WebViewDescriptor;
use crate::privacy::PrivacyResponse;

/// Merge the sources available at the end of the fetch stages. Source
/// precedence for the web view descriptor is baseline (cached or
/// in-memory) over fetched config over the privacy fallback; endpoint,
/// retry and experiment tables come from the fetched config when present
/// and from the baseline otherwise.
pub fn resolve(
    baseline: &SdkConfig,
    fetched: Option<&RemoteConfig>,
    privacy: Option<&PrivacyResponse>,
) -> Result<SdkConfig, ConfigError> {
    let mut effective = baseline.clone();
    if let Some(remote) = fetched {
        if let Some(url) = &remote.config_url {
            effective.config_url = url.clone();
        }
        if let Some(url) = &remote.privacy_url {
            effective.privacy_url = url.clone();
        }
        if let Some(retry) = remote.request_retry {
            effective.config_retry = retry;
        }
        if let Some(retry) = remote.web_view_retry {
            effective.web_view_retry = retry;
        }
        effective.experiments = remote.experiments.clone();
    }
    effective.web_view = Some(select_descriptor(baseline, fetched, privacy)?);
    Ok(effective)
}

fn select_descriptor(
    baseline: &SdkConfig,
    fetched: Option<&RemoteConfig>,
    privacy: Option<&PrivacyResponse>,
) -> Result<WebViewDescriptor, ConfigError> {
    if let Some(descriptor) = baseline.usable_web_view() {
        return Ok(descriptor);
    }
    if let Some(descriptor) = fetched
        .map(RemoteConfig::web_view_descriptor)
        .filter(WebViewDescriptor::is_usable)
    {
        return Ok(descriptor);
    }
    if let Some(descriptor) = privacy.and_then(PrivacyResponse::web_view_fallback) {
        return Ok(descriptor);
    }
    Err(ConfigError::NoWebViewSource)
}

/// A configuration source feeding the descriptor slot. Each source reports
/// exactly once per attempt, with or without a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorSource {
    Baseline,
    Privacy,
    ConfigResponse,
}

const SOURCE_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    Pending,
    Ready(WebViewDescriptor),
    Exhausted,
}

/// One-shot cell the download stage blocks on. The first usable offer wins
/// and is never displaced, which keeps the expected hash stable for the
/// rest of the attempt; once every source has reported without a usable
/// candidate the slot resolves to [`SlotState::Exhausted`].
#[derive(Debug)]
pub struct DescriptorSlot {
    inner: Mutex<SlotInner>,
    tx: watch::Sender<SlotState>,
    rx: watch::Receiver<SlotState>,
}

#[derive(Debug, Default)]
struct SlotInner {
    reported: [bool; SOURCE_COUNT],
    resolved: bool,
}

impl Default for DescriptorSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorSlot {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(SlotState::Pending);
        Self {
            inner: Mutex::new(SlotInner::default()),
            tx,
            rx,
        }
    }

    pub fn offer(&self, source: DescriptorSource, candidate: Option<WebViewDescriptor>) {
        let usable = candidate.filter(WebViewDescriptor::is_usable);
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let index = source as usize;
        if inner.reported[index] {
            return;
        }
        inner.reported[index] = true;
        if inner.resolved {
            return;
        }
        if let Some(descriptor) = usable {
            inner.resolved = true;
            debug!(?source, hash = %descriptor.expected_hash, "web view descriptor resolved");
            let _ = self.tx.send(SlotState::Ready(descriptor));
        } else if inner.reported.iter().all(|reported| *reported) {
            debug!("every descriptor source reported without a usable candidate");
            let _ = self.tx.send(SlotState::Exhausted);
        }
    }

    /// Wait until the slot leaves [`SlotState::Pending`].
    pub async fn resolved(&self) -> SlotState {
        let mut rx = self.rx.clone();
        match rx
            .wait_for(|state| !matches!(state, SlotState::Pending))
            .await
        {
            Ok(state) => state.clone(),
            Err(_) => SlotState::Exhausted,
        }
    }
}
