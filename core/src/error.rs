use thiserror::Error;

/// Terminal error taxonomy for one initialization attempt.
///
/// Every variant is cheap to clone: the state machine stores the terminal
/// failure and replays it verbatim to callers that arrive after the attempt
/// has finished.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitError {
    /// Connection-level failure surfaced by the transport. Retryable.
    #[error("transport failure: {0}")]
    Transport(String),
    /// Non-2xx response from an endpoint. Retryable for 5xx only.
    #[error("server returned status {status}")]
    Server { status: u16 },
    /// A received payload does not fit the expected schema. Never retried.
    #[error("could not parse configuration response: {0}")]
    Parse(String),
    /// The downloaded asset failed its integrity check. Never retried.
    #[error("downloaded file is invalid. request: {url}")]
    InvalidFile { url: String },
    /// No configuration source supplied a usable web view URL.
    #[error("no usable web view source in any configuration")]
    NoWebViewSource,
    /// The privacy endpoint rejected this caller with a defined fatal code.
    #[error("privacy endpoint rejected the caller with code {code}")]
    PrivacyDenied { code: u16 },
    /// Black-box module initialization or reset failed.
    #[error("module '{module}' failed: {reason}")]
    Module { module: String, reason: String },
    /// The web view runtime could not be created from a valid asset.
    #[error("web view runtime creation failed: {0}")]
    Runtime(String),
    /// The shared attempt task died without publishing an outcome.
    #[error("initialization attempt aborted")]
    Aborted,
}

impl InitError {
    /// Transient errors are eligible for retry; everything else is terminal
    /// on first sight.
    pub fn is_retryable(&self) -> bool {
        match self {
            InitError::Transport(_) => true,
            InitError::Server { status } => *status >= 500,
            _ => false,
        }
    }
}
