use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::config::WebViewDescriptor;
use crate::error::InitError;

/// Status code the privacy endpoint uses to signal that the SDK is
/// disabled for this caller. Unlike every other privacy failure, this one
/// aborts the whole attempt.
pub const PRIVACY_DENIED_STATUS: u16 = 423;

/// Consent and legal-basis data returned by the privacy endpoint, plus the
/// optional web view fallback fields used when no other source supplies a
/// descriptor. Transient: nothing here is persisted unless the attempt
/// succeeds and the resolved configuration absorbs it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyResponse {
    #[serde(default)]
    pub allow_tracking: Option<bool>,
    #[serde(default)]
    pub legal_framework: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
}

impl PrivacyResponse {
    /// Lenient parse: the privacy payload is best-effort data, so a body
    /// that does not decode yields no response rather than a fatal error.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match serde_json::from_slice(bytes) {
            Ok(response) => Some(response),
            Err(err) => {
                warn!("discarding undecodable privacy payload: {err}");
                None
            }
        }
    }

    /// Fallback descriptor carried by the privacy response, if both fields
    /// are present and pass validation.
    pub fn web_view_fallback(&self) -> Option<WebViewDescriptor> {
        let url = self.url.clone()?;
        let hash = self.hash.clone()?;
        Some(WebViewDescriptor::new(url, hash)).filter(WebViewDescriptor::is_usable)
    }
}

/// Map a privacy endpoint status onto the defined fatal codes.
pub fn fatal_privacy_error(status: u16) -> Option<InitError> {
    (status == PRIVACY_DENIED_STATUS).then_some(InitError::PrivacyDenied { code: status })
}
