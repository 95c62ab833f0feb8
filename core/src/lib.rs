//! Bootstrap core of the ignite SDK.
//!
//! Before the SDK can serve anything it has to fetch remote configuration
//! and consent data, resolve a downloadable web view bundle, validate and
//! cache it, and only then flip into a usable state. This crate owns that
//! pipeline: the [`SdkInitializer`] state machine with its single-flight
//! guarantee, the concurrent fetch graph behind it, the retry/backoff and
//! caching policies, and the per-attempt diagnostic report every stage
//! feeds. Host-facing collaborators (HTTP transport, module set, web view
//! runtime, diagnostics sink) are injected as trait objects so builds and
//! tests can vary them freely.

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod init;
pub mod metrics;
pub mod modules;
pub mod privacy;
pub mod retry;
pub mod store;
pub mod transport;

pub use cache::AssetCache;
pub use cache::CachedAsset;
pub use cache::sha256_hex;
pub use config::RemoteConfig;
pub use config::SdkConfig;
pub use config::WebViewDescriptor;
pub use diagnostics::DiagnosticReport;
pub use diagnostics::DiagnosticsSink;
pub use diagnostics::LogSink;
pub use error::InitError;
pub use init::BootstrapError;
pub use init::InitState;
pub use init::SdkInitializer;
pub use init::SdkServices;
pub use metrics::MetricEvent;
pub use metrics::MetricOutcome;
pub use metrics::MetricsCollector;
pub use metrics::RequestKind;
pub use metrics::TaskKind;
pub use modules::ModuleLifecycle;
pub use modules::WebViewRuntime;
pub use privacy::PrivacyResponse;
pub use retry::RetryConfig;
pub use retry::RetryPolicy;
pub use store::SdkStore;
pub use transport::ReqwestTransport;
pub use transport::Transport;
