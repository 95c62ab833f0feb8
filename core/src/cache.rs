use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use tracing::warn;

use crate::store::SdkStore;
use crate::store::StoreError;

/// Hex-encoded SHA-256 of a byte payload; the content address every asset
/// is stored and looked up under.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Bytes of a previously downloaded web view bundle plus the hash they
/// were stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAsset {
    pub hash: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct CacheHitMiss {
    pub hits: u64,
    pub misses: u64,
}

/// Content-addressed lookup over the asset store. Lookup is a pure hash
/// equality check: an on-disk payload that no longer hashes to its own name
/// is treated as a miss and never served.
#[derive(Debug)]
pub struct AssetCache {
    store: Arc<SdkStore>,
    hit_counter: AtomicU64,
    miss_counter: AtomicU64,
}

impl AssetCache {
    pub fn new(store: Arc<SdkStore>) -> Self {
        Self {
            store,
            hit_counter: AtomicU64::new(0),
            miss_counter: AtomicU64::new(0),
        }
    }

    pub fn lookup(&self, hash: &str) -> Option<CachedAsset> {
        let bytes = match self.store.load_asset(hash) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.miss_counter.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Err(err) => {
                warn!("asset cache read failed for {hash}: {err}");
                self.miss_counter.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        if sha256_hex(&bytes) != hash {
            warn!("asset cache entry {hash} no longer matches its hash, discarding");
            self.miss_counter.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.hit_counter.fetch_add(1, Ordering::Relaxed);
        Some(CachedAsset {
            hash: hash.to_string(),
            bytes,
        })
    }

    pub fn insert(&self, bytes: &[u8], hash: &str) -> Result<(), StoreError> {
        self.store.save_asset(bytes, hash)
    }

    pub fn hit_miss(&self) -> CacheHitMiss {
        CacheHitMiss {
            hits: self.hit_counter.load(Ordering::Relaxed),
            misses: self.miss_counter.load(Ordering::Relaxed),
        }
    }
}
