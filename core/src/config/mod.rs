//! Effective configuration model and the wire schema of the config
//! endpoint.
//!
//! [`SdkConfig`] is what the rest of the SDK consumes: it is resolved once
//! per attempt by [`resolver`], immutable afterwards, and persisted to the
//! local store as a side effect of successful resolution.

mod resolver;

pub use resolver::DescriptorSlot;
pub use resolver::DescriptorSource;
pub use resolver::SlotState;
pub use resolver::resolve;

use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

use crate::error::InitError;
use crate::retry::RetryConfig;

pub const DEFAULT_CONFIG_URL: &str = "https://config.ignite-sdk.io/v1/configuration";
pub const DEFAULT_PRIVACY_URL: &str = "https://privacy.ignite-sdk.io/v1/consent";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("could not parse configuration response: {0}")]
    ParseFailure(String),
    #[error("no usable web view source")]
    NoWebViewSource,
    #[error("invalid web view url '{0}'")]
    InvalidUrl(String),
}

impl From<ConfigError> for InitError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::ParseFailure(reason) => InitError::Parse(reason),
            ConfigError::NoWebViewSource | ConfigError::InvalidUrl(_) => {
                InitError::NoWebViewSource
            }
        }
    }
}

/// Where to download the renderable web view bundle from, and the SHA-256
/// the payload must hash to.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebViewDescriptor {
    pub url: String,
    pub expected_hash: String,
}

impl WebViewDescriptor {
    pub fn new(url: impl Into<String>, expected_hash: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            expected_hash: expected_hash.into(),
        }
    }

    /// A descriptor is usable when its URL is well-formed and absolute and
    /// it names a content hash to validate the download against.
    pub fn validate(&self) -> Result<Url, ConfigError> {
        if self.expected_hash.is_empty() {
            return Err(ConfigError::NoWebViewSource);
        }
        Url::parse(&self.url).map_err(|_| ConfigError::InvalidUrl(self.url.clone()))
    }

    pub fn is_usable(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Descriptor identity is the content hash: two descriptors pointing at
/// different mirrors of the same bytes are the same asset, which is exactly
/// the cache-hit condition.
impl PartialEq for WebViewDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.expected_hash == other.expected_hash
    }
}

/// The resolved configuration consumed by the rest of the SDK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkConfig {
    pub app_id: String,
    pub config_url: String,
    pub privacy_url: String,
    pub config_retry: RetryConfig,
    pub web_view_retry: RetryConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_view: Option<WebViewDescriptor>,
    #[serde(default)]
    pub experiments: BTreeMap<String, bool>,
}

impl SdkConfig {
    /// Compiled-in baseline used before any remote or cached configuration
    /// is available.
    pub fn for_app(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            config_url: DEFAULT_CONFIG_URL.to_string(),
            privacy_url: DEFAULT_PRIVACY_URL.to_string(),
            config_retry: RetryConfig::default(),
            web_view_retry: RetryConfig::default(),
            web_view: None,
            experiments: BTreeMap::new(),
        }
    }

    pub fn experiment(&self, name: &str) -> bool {
        self.experiments.get(name).copied().unwrap_or(false)
    }

    /// The descriptor this configuration contributes to resolution, if it
    /// carries one that passes validation.
    pub fn usable_web_view(&self) -> Option<WebViewDescriptor> {
        self.web_view.clone().filter(WebViewDescriptor::is_usable)
    }
}

/// Wire schema of the config endpoint. `url` and `hash` are mandatory: a
/// payload without them does not describe a bootable SDK and is rejected as
/// corrupt rather than patched over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    pub url: String,
    pub hash: String,
    #[serde(default)]
    pub config_url: Option<String>,
    #[serde(default)]
    pub privacy_url: Option<String>,
    #[serde(default)]
    pub request_retry: Option<RetryConfig>,
    #[serde(default)]
    pub web_view_retry: Option<RetryConfig>,
    #[serde(default)]
    pub experiments: BTreeMap<String, bool>,
}

impl RemoteConfig {
    pub fn parse(bytes: &[u8]) -> Result<Self, ConfigError> {
        serde_json::from_slice(bytes).map_err(|err| ConfigError::ParseFailure(err.to_string()))
    }

    pub fn web_view_descriptor(&self) -> WebViewDescriptor {
        WebViewDescriptor::new(self.url.clone(), self.hash.clone())
    }
}
