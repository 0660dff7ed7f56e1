//! Inference provider trait and shared types
//!
//! Defines the common interface for all generation backends (local engine,
//! OpenAI, Claude, Gemini)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::InferenceError;

/// Provider type identifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Local,
    OpenAi,
    Claude,
    Gemini,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Local => "local",
            ProviderType::OpenAi => "openai",
            ProviderType::Claude => "claude",
            ProviderType::Gemini => "gemini",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a provider instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProviderState {
    Uninitialized,
    Initializing,
    Ready,
    Disposed,
    Error,
}

/// Caller-supplied provider configuration.
///
/// All fields are optional; remote types reject construction without an
/// `api_key` (enforced by the registry before the provider exists).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Local variant only: load exactly `model`, with no catalog fallback
    #[serde(default)]
    pub pin_model: bool,
}

/// Result of a successful generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResponse {
    pub reply: String,
    pub provider: String,
    pub model: String,
    pub tokens_used: Option<u32>,
    pub latency_ms: Option<u64>,
}

/// Callback for streamed token fragments
pub type StreamCallback = Box<dyn Fn(String) + Send + Sync>;

/// The contract every generation backend must satisfy
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Stable type identifier for registry lookups
    fn provider_type(&self) -> ProviderType;

    /// Human-readable provider name
    fn provider_name(&self) -> &'static str;

    /// The currently active model. For the local variant this reflects the
    /// candidate that actually loaded, which may differ from the one first
    /// requested; callers must read it back rather than assume.
    async fn model_name(&self) -> String;

    /// Pure format/heuristic key check; no network call. Usable for
    /// pre-flight validation independent of `initialize`.
    fn validate_api_key(&self, key: &str) -> bool;

    async fn is_ready(&self) -> bool;

    /// Bring the provider to Ready. Idempotent once successful.
    async fn initialize(&self) -> Result<(), InferenceError>;

    /// Turn a system+user prompt pair into a reply. Fails with
    /// `NotInitialized` before `initialize` or after `dispose`.
    async fn generate_reply(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<InferenceResponse, InferenceError>;

    /// Release held resources; idempotent.
    async fn dispose(&self) -> Result<(), InferenceError>;
}

impl fmt::Debug for dyn InferenceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceProvider")
            .field("provider_type", &self.provider_type())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_strings() {
        assert_eq!(ProviderType::Local.as_str(), "local");
        assert_eq!(ProviderType::Claude.to_string(), "claude");
    }

    #[test]
    fn test_provider_type_serde_round_trip() {
        let json = serde_json::to_string(&ProviderType::OpenAi).unwrap();
        assert_eq!(json, "\"open_ai\"");
        let back: ProviderType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ProviderType::OpenAi);
    }
}
