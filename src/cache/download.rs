//! Shard download logic
//!
//! Shards are fetched strictly sequentially to bound peak memory and keep
//! progress accounting deterministic. A failed shard aborts the whole
//! operation; partial downloads are never handed back to the caller.

use bytes::BytesMut;
use futures_util::StreamExt;
use reqwest::Client;
use std::sync::Arc;

use super::types::{DownloadProgress, ModelShard};
use crate::error::InferenceError;

/// Callback invoked with per-shard and aggregate download progress
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Result of the pre-download metadata probe for one shard
struct ShardMeta {
    expected_size: u64,
    etag: Option<String>,
}

/// Probe a shard URL for its expected size (best effort).
///
/// A failed probe yields size 0, which degrades progress fidelity for that
/// shard but never aborts the download.
async fn probe_shard(client: &Client, url: &str) -> ShardMeta {
    match client.head(url).send().await {
        Ok(response) if response.status().is_success() => {
            let etag = response
                .headers()
                .get(reqwest::header::ETAG)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim_matches('"').to_string());
            ShardMeta {
                expected_size: response.content_length().unwrap_or(0),
                etag,
            }
        }
        Ok(response) => {
            log::warn!("Size probe for {} returned {}", url, response.status());
            ShardMeta {
                expected_size: 0,
                etag: None,
            }
        }
        Err(e) => {
            log::warn!("Size probe for {} failed: {}", url, e);
            ShardMeta {
                expected_size: 0,
                etag: None,
            }
        }
    }
}

/// Percentage of `loaded` against `expected`, clamped to 0..100.
/// Unknown expected size (0) reports 0% until completion.
pub(crate) fn percent(loaded: u64, expected: u64) -> f32 {
    if expected == 0 {
        0.0
    } else {
        ((loaded as f64 / expected as f64) * 100.0).min(100.0) as f32
    }
}

/// Download every shard in order, reporting progress through `on_progress`.
pub async fn download_shards(
    client: &Client,
    urls: &[String],
    on_progress: Option<ProgressCallback>,
) -> Result<Vec<ModelShard>, InferenceError> {
    let total_shards = urls.len();

    // Probe all shards up front so aggregate progress has a denominator
    let mut metas = Vec::with_capacity(total_shards);
    for url in urls {
        metas.push(probe_shard(client, url).await);
    }
    let total_expected: u64 = metas.iter().map(|m| m.expected_size).sum();

    let mut shards = Vec::with_capacity(total_shards);
    let mut completed_bytes: u64 = 0;

    for (index, url) in urls.iter().enumerate() {
        log::info!(
            "Downloading shard {}/{}: {}",
            index + 1,
            total_shards,
            url
        );

        let response = client.get(url).send().await.map_err(|e| {
            InferenceError::DownloadFailed(format!("shard {} ({}): {}", index, url, e))
        })?;

        if !response.status().is_success() {
            return Err(InferenceError::DownloadFailed(format!(
                "shard {} ({}): HTTP {}",
                index,
                url,
                response.status()
            )));
        }

        // Prefer the GET content-length when the probe came up empty
        let expected = if metas[index].expected_size > 0 {
            metas[index].expected_size
        } else {
            response.content_length().unwrap_or(0)
        };

        let mut buffer = BytesMut::with_capacity(expected as usize);
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| {
                InferenceError::DownloadFailed(format!("shard {} ({}): {}", index, url, e))
            })?;
            buffer.extend_from_slice(&chunk);

            if let Some(ref cb) = on_progress {
                let loaded = buffer.len() as u64;
                cb(DownloadProgress {
                    shard_index: index,
                    total_shards,
                    shard_progress: percent(loaded, expected),
                    total_progress: percent(completed_bytes + loaded, total_expected),
                    current_shard_url: url.clone(),
                    bytes_loaded: completed_bytes + loaded,
                    total_bytes: total_expected,
                });
            }
        }

        let data = buffer.freeze();
        completed_bytes += data.len() as u64;
        shards.push(ModelShard::new(url.clone(), data, metas[index].etag.clone()));
    }

    // Final 100% tick once every shard landed
    if let Some(ref cb) = on_progress {
        cb(DownloadProgress {
            shard_index: total_shards.saturating_sub(1),
            total_shards,
            shard_progress: 100.0,
            total_progress: 100.0,
            current_shard_url: urls.last().cloned().unwrap_or_default(),
            bytes_loaded: completed_bytes,
            total_bytes: total_expected.max(completed_bytes),
        });
    }

    Ok(shards)
}
