//! Persistent key-value storage behind the model cache
//!
//! One logical key maps to one opaque record. Writes are whole-record
//! replacements; the file backend stages into a temp file and renames so a
//! concurrent reader never observes a half-written entry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::InferenceError;

/// Single-key atomic storage for cache records
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, InferenceError>;
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), InferenceError>;
    async fn remove(&self, key: &str) -> Result<(), InferenceError>;
}

/// File-backed store: one file per key under a base directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        if !dir.exists() {
            std::fs::create_dir_all(&dir).ok();
        }
        Self { dir }
    }

    /// Default location under the platform data directory
    pub fn default_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("reply-engine")
            .join("model_cache")
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are internal identifiers, but sanitize anyway
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        self.dir.join(format!("{}.cache", safe))
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, InferenceError> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(InferenceError::Other(format!(
                "Failed to read cache record: {}",
                e
            ))),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), InferenceError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    InferenceError::Other(format!("Failed to create cache directory: {}", e))
                })?;
            }
        }

        let temp_path = path.with_extension("cache.tmp");
        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| InferenceError::Other(format!("Failed to create temp file: {}", e)))?;

        file.write_all(value)
            .await
            .map_err(|e| InferenceError::Other(format!("Failed to write cache record: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| InferenceError::Other(format!("Failed to flush cache record: {}", e)))?;
        drop(file);

        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| InferenceError::Other(format!("Failed to rename temp file: {}", e)))?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), InferenceError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(InferenceError::Other(format!(
                "Failed to remove cache record: {}",
                e
            ))),
        }
    }
}

/// In-memory store for tests and embedded use
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, InferenceError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), InferenceError> {
        self.records
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), InferenceError> {
        self.records.write().await.remove(key);
        Ok(())
    }
}
