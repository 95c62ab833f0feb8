use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::cache::CachedAsset;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("module '{module}' failed: {reason}")]
pub struct ModuleError {
    pub module: String,
    pub reason: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct RuntimeError(pub String);

/// Black-box module set the orchestrator drives after its fetch stages.
/// Module sets vary by build, so the initializer holds a trait object
/// rather than a concrete type.
#[async_trait]
pub trait ModuleLifecycle: Send + Sync {
    async fn init_modules(&self) -> Result<(), ModuleError>;
    async fn reset(&self) -> Result<(), ModuleError>;
}

/// Bridge that turns a validated asset into a live web view. Everything
/// about the asset's content and runtime is behind this boundary.
#[async_trait]
pub trait WebViewRuntime: Send + Sync {
    async fn create(&self, asset: &CachedAsset) -> Result<(), RuntimeError>;
}

/// Stock module set for builds that carry no optional modules.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultModuleSet;

#[async_trait]
impl ModuleLifecycle for DefaultModuleSet {
    async fn init_modules(&self) -> Result<(), ModuleError> {
        debug!("no optional modules configured");
        Ok(())
    }

    async fn reset(&self) -> Result<(), ModuleError> {
        debug!("module state reset");
        Ok(())
    }
}

/// Runtime placeholder for hosts that materialise the web view elsewhere;
/// it only insists the asset is not empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultWebViewRuntime;

#[async_trait]
impl WebViewRuntime for DefaultWebViewRuntime {
    async fn create(&self, asset: &CachedAsset) -> Result<(), RuntimeError> {
        if asset.bytes.is_empty() {
            return Err(RuntimeError("asset is empty".to_string()));
        }
        debug!(hash = %asset.hash, "web view runtime created");
        Ok(())
    }
}
