//! Model Cache Types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One downloadable fragment of a model's binary weights
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelShard {
    /// Source URL the shard was fetched from
    pub url: String,
    /// Raw shard bytes
    pub data: Bytes,
    /// Size in bytes (always `data.len()`)
    pub size: u64,
    /// Upstream ETag when the size probe exposed one; informational only
    pub checksum: Option<String>,
}

impl ModelShard {
    pub fn new(url: impl Into<String>, data: Bytes, checksum: Option<String>) -> Self {
        let size = data.len() as u64;
        Self {
            url: url.into(),
            data,
            size,
            checksum,
        }
    }
}

/// The persisted cache record: one per cache key, replaced wholesale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub shards: Vec<ModelShard>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub total_size: u64,
}

/// Download progress information, emitted as a callback stream and never stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub shard_index: usize,
    pub total_shards: usize,
    /// 0..100 for the current shard; 0 when the expected size is unknown
    pub shard_progress: f32,
    /// 0..100 across all shards
    pub total_progress: f32,
    pub current_shard_url: String,
    pub bytes_loaded: u64,
    pub total_bytes: u64,
}

/// Read-only cache introspection for UI reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInfo {
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl CacheInfo {
    pub fn absent() -> Self {
        Self {
            cached: false,
            size: None,
            timestamp: None,
        }
    }
}

/// Format a byte count for display (unit-scaled, 2-decimal rounding for
/// non-exact values)
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if value.fract() == 0.0 {
        format!("{} {}", value as u64, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
