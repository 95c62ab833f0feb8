use std::fs;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::SdkConfig;

const CONFIG_FILE: &str = "config.json";
const ASSETS_DIR: &str = "webview";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Filesystem persistence for the SDK: the last successfully resolved
/// configuration and the downloaded web view assets, rooted at a directory
/// the host application owns.
#[derive(Debug, Clone)]
pub struct SdkStore {
    root: PathBuf,
}

impl SdkStore {
    /// Open (or initialise) the store rooted at the provided path.
    pub fn open(root: PathBuf) -> Result<Self, StoreError> {
        let store = Self { root };
        store.ensure_layout()?;
        Ok(store)
    }

    fn ensure_layout(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.root.join(ASSETS_DIR))?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    fn asset_path(&self, hash: &str) -> PathBuf {
        self.root.join(ASSETS_DIR).join(format!("{hash}.bin"))
    }

    /// Load the cached configuration, if one has been persisted.
    pub fn load_config(&self) -> Result<Option<SdkConfig>, StoreError> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Persist the resolved configuration, overwriting any prior value.
    pub fn save_config(&self, config: &SdkConfig) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(config)?;
        fs::write(self.config_path(), bytes)?;
        Ok(())
    }

    pub fn load_asset(&self, hash: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.asset_path(hash);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    pub fn save_asset(&self, bytes: &[u8], hash: &str) -> Result<(), StoreError> {
        fs::write(self.asset_path(hash), bytes)?;
        Ok(())
    }
}
