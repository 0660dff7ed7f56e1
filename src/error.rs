//! Error taxonomy shared by every provider and the cache subsystem

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error kinds for inference and model-cache operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum InferenceError {
    /// API key missing, malformed, or rejected during a verification probe
    InvalidKey(String),
    /// Operation attempted before initialize() completed or after dispose()
    NotInitialized,
    /// Provider type was never registered with the registry
    NotRegistered(String),
    /// No valid cache entry exists for the requested key
    NotCached(String),
    /// Shard download failed (names the failing shard)
    DownloadFailed(String),
    /// Transport-level failure
    Network(String),
    /// Upstream throttling signal
    RateLimit(String),
    /// Upstream unavailable, or the local engine exhausted its fallback chain
    ProviderDown(String),
    /// Malformed upstream payload
    InvalidResponse(String),
    /// Upstream quota exhausted
    QuotaExceeded(String),
    /// Generic error
    Other(String),
}

impl fmt::Display for InferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceError::InvalidKey(msg) => write!(f, "Invalid API key: {}", msg),
            InferenceError::NotInitialized => write!(f, "Provider not initialized"),
            InferenceError::NotRegistered(msg) => write!(f, "Provider not registered: {}", msg),
            InferenceError::NotCached(msg) => write!(f, "No cached model: {}", msg),
            InferenceError::DownloadFailed(msg) => write!(f, "Download failed: {}", msg),
            InferenceError::Network(msg) => write!(f, "Network error: {}", msg),
            InferenceError::RateLimit(msg) => write!(f, "Rate limited: {}", msg),
            InferenceError::ProviderDown(msg) => write!(f, "Provider unavailable: {}", msg),
            InferenceError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            InferenceError::QuotaExceeded(msg) => write!(f, "Quota exceeded: {}", msg),
            InferenceError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for InferenceError {}

impl InferenceError {
    /// True for the credential-flavored kinds
    pub fn is_auth_error(&self) -> bool {
        matches!(self, InferenceError::InvalidKey(_))
    }
}

/// Classify an upstream HTTP failure into the shared taxonomy.
///
/// The status code is the primary signal; `body` is only consulted to
/// distinguish quota exhaustion from plain throttling on 429.
pub fn classify_status(status: reqwest::StatusCode, body: &str) -> InferenceError {
    let msg = if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, truncate(body, 200))
    };

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        InferenceError::InvalidKey(msg)
    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let lower = body.to_lowercase();
        if lower.contains("quota") || lower.contains("billing") {
            InferenceError::QuotaExceeded(msg)
        } else {
            InferenceError::RateLimit(msg)
        }
    } else if status.is_server_error() {
        InferenceError::ProviderDown(msg)
    } else {
        InferenceError::InvalidResponse(msg)
    }
}

/// Classify a failure by message wording when no status code is available.
///
/// The phrase list is a heuristic tied to upstream wording and is not
/// exhaustive; unmatched messages fall through to `Network`.
pub fn classify_message(msg: &str) -> InferenceError {
    let lower = msg.to_lowercase();
    if lower.contains("quota") || lower.contains("billing") {
        InferenceError::QuotaExceeded(msg.to_string())
    } else if lower.contains("rate") || lower.contains("throttl") {
        InferenceError::RateLimit(msg.to_string())
    } else if lower.contains("unauthorized")
        || lower.contains("api key")
        || lower.contains("authentication")
        || lower.contains("forbidden")
    {
        InferenceError::InvalidKey(msg.to_string())
    } else if lower.contains("unavailable") || lower.contains("down") || lower.contains("overloaded")
    {
        InferenceError::ProviderDown(msg.to_string())
    } else {
        InferenceError::Network(msg.to_string())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_auth() {
        let err = classify_status(reqwest::StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(err, InferenceError::InvalidKey(_)));
    }

    #[test]
    fn test_classify_status_rate_vs_quota() {
        let rate = classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(rate, InferenceError::RateLimit(_)));

        let quota = classify_status(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "You exceeded your current quota",
        );
        assert!(matches!(quota, InferenceError::QuotaExceeded(_)));
    }

    #[test]
    fn test_classify_status_server_error() {
        let err = classify_status(reqwest::StatusCode::SERVICE_UNAVAILABLE, "");
        assert!(matches!(err, InferenceError::ProviderDown(_)));
    }

    #[test]
    fn test_classify_message_fallback() {
        assert!(matches!(
            classify_message("rate limit reached"),
            InferenceError::RateLimit(_)
        ));
        assert!(matches!(
            classify_message("service temporarily unavailable"),
            InferenceError::ProviderDown(_)
        ));
        assert!(matches!(
            classify_message("invalid api key provided"),
            InferenceError::InvalidKey(_)
        ));
        assert!(matches!(
            classify_message("connection reset by peer"),
            InferenceError::Network(_)
        ));
    }
}
