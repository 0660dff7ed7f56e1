//! Model Cache Manager
//!
//! Persists downloaded model shards under a single cache key, with time-based
//! expiry and version invalidation. Freshness is time-based rather than
//! content-hash-based: artifacts are versioned by release string, so a version
//! mismatch is the primary invalidation signal and the TTL is a safety net
//! against stale long-lived caches.

use chrono::{Duration, Utc};
use reqwest::Client;
use std::sync::Arc;

use super::download::{download_shards, ProgressCallback};
use super::store::CacheStore;
use super::types::{CacheEntry, CacheInfo, ModelShard};
use crate::error::InferenceError;

/// Bumped whenever the shard layout or the curated model set changes
pub const CACHE_VERSION: &str = "2";

/// Entries older than this are evicted on read
pub const MAX_CACHE_AGE_DAYS: i64 = 7;

const DEFAULT_CACHE_KEY: &str = "local-model";

/// Manages download, persistence, and eviction of model shards
pub struct ModelCacheManager {
    store: Arc<dyn CacheStore>,
    client: Client,
    cache_key: String,
}

impl ModelCacheManager {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self::with_key(store, DEFAULT_CACHE_KEY)
    }

    pub fn with_key(store: Arc<dyn CacheStore>, cache_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(3600))
            .build()
            .unwrap_or_default();

        Self {
            store,
            client,
            cache_key: cache_key.into(),
        }
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Read and decode the stored entry without validity checks
    async fn load_entry(&self) -> Result<Option<CacheEntry>, InferenceError> {
        let Some(raw) = self.store.get(&self.cache_key).await? else {
            return Ok(None);
        };

        match serde_json::from_slice::<CacheEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                // Undecodable record: treat as absent and drop it
                log::warn!("Discarding corrupt cache record: {}", e);
                self.store.remove(&self.cache_key).await?;
                Ok(None)
            }
        }
    }

    fn entry_is_valid(entry: &CacheEntry) -> bool {
        if entry.shards.is_empty() {
            return false;
        }
        if entry.version != CACHE_VERSION {
            log::info!(
                "Cache version mismatch (stored {}, current {})",
                entry.version,
                CACHE_VERSION
            );
            return false;
        }
        let age = Utc::now().signed_duration_since(entry.timestamp);
        if age >= Duration::days(MAX_CACHE_AGE_DAYS) {
            log::info!("Cache entry expired ({} hours old)", age.num_hours());
            return false;
        }
        true
    }

    /// True iff a valid entry exists. Expired or version-stale entries are
    /// evicted as a side effect (lazy eviction on read).
    pub async fn is_cached(&self) -> Result<bool, InferenceError> {
        match self.load_entry().await? {
            Some(entry) if Self::entry_is_valid(&entry) => Ok(true),
            Some(_) => {
                self.store.remove(&self.cache_key).await?;
                Ok(false)
            }
            None => Ok(false),
        }
    }

    /// Return the cached shards, failing with `NotCached` when no valid entry
    /// exists. Callers should check `is_cached` first or handle the failure.
    pub async fn get_cached_model(&self) -> Result<Vec<ModelShard>, InferenceError> {
        match self.load_entry().await? {
            Some(entry) if Self::entry_is_valid(&entry) => Ok(entry.shards),
            Some(_) => {
                self.store.remove(&self.cache_key).await?;
                Err(InferenceError::NotCached(self.cache_key.clone()))
            }
            None => Err(InferenceError::NotCached(self.cache_key.clone())),
        }
    }

    /// Download every shard and persist the result on full success.
    pub async fn download_and_cache(
        &self,
        urls: &[String],
        on_progress: Option<ProgressCallback>,
    ) -> Result<Vec<ModelShard>, InferenceError> {
        let shards = download_shards(&self.client, urls, on_progress).await?;
        self.cache_model(&shards).await?;
        Ok(shards)
    }

    /// Persist shards under the cache key, replacing any prior entry.
    pub async fn cache_model(&self, shards: &[ModelShard]) -> Result<(), InferenceError> {
        let total_size = shards.iter().map(|s| s.size).sum();
        let entry = CacheEntry {
            shards: shards.to_vec(),
            timestamp: Utc::now(),
            version: CACHE_VERSION.to_string(),
            total_size,
        };

        let raw = serde_json::to_vec(&entry)
            .map_err(|e| InferenceError::Other(format!("Failed to encode cache entry: {}", e)))?;
        self.store.set(&self.cache_key, &raw).await?;

        log::info!(
            "Cached {} shard(s), {} total",
            shards.len(),
            super::types::format_bytes(total_size)
        );
        Ok(())
    }

    /// Remove the entry unconditionally; idempotent.
    pub async fn clear_cache(&self) -> Result<(), InferenceError> {
        self.store.remove(&self.cache_key).await
    }

    /// Read-only introspection; never fails.
    pub async fn cache_info(&self) -> CacheInfo {
        match self.load_entry().await {
            Ok(Some(entry)) if Self::entry_is_valid(&entry) => CacheInfo {
                cached: true,
                size: Some(entry.total_size),
                timestamp: Some(entry.timestamp),
            },
            _ => CacheInfo::absent(),
        }
    }
}
