//! Claude API provider

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::cleaner::clean_reply;
use crate::error::{classify_message, classify_status, InferenceError};
use crate::provider::{
    InferenceProvider, InferenceResponse, ProviderConfig, ProviderState, ProviderType,
};

const API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_MAX_TOKENS: u32 = 512;

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<UserMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct UserMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
}

pub struct ClaudeProvider {
    api_key: Option<String>,
    model: String,
    client: Client,
    config: ProviderConfig,
    state: RwLock<ProviderState>,
}

impl ClaudeProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(
                config.timeout_secs.unwrap_or(60),
            ))
            .build()
            .unwrap_or_default();

        Self {
            api_key: config.api_key.clone(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client,
            config,
            state: RwLock::new(ProviderState::Uninitialized),
        }
    }

    fn key(&self) -> Result<&str, InferenceError> {
        match self.api_key.as_deref() {
            Some(k) if !k.is_empty() => Ok(k),
            _ => Err(InferenceError::InvalidKey("no API key supplied".to_string())),
        }
    }

    /// Cheap verification request; only auth failures block readiness.
    async fn verify_key(&self, key: &str) -> Result<(), InferenceError> {
        let url = format!("{}/models", API_BASE);
        let result = self
            .client
            .get(&url)
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                if status == reqwest::StatusCode::UNAUTHORIZED
                    || status == reqwest::StatusCode::FORBIDDEN
                {
                    let body = response.text().await.unwrap_or_default();
                    return Err(classify_status(status, &body));
                }
                Ok(())
            }
            Err(e) => {
                log::warn!("Claude key verification probe failed (tolerated): {}", e);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl InferenceProvider for ClaudeProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Claude
    }

    fn provider_name(&self) -> &'static str {
        "Claude"
    }

    async fn model_name(&self) -> String {
        self.model.clone()
    }

    fn validate_api_key(&self, key: &str) -> bool {
        key.starts_with("sk-ant-") && key.len() >= 30
    }

    async fn is_ready(&self) -> bool {
        *self.state.read().await == ProviderState::Ready
    }

    async fn initialize(&self) -> Result<(), InferenceError> {
        if *self.state.read().await == ProviderState::Ready {
            return Ok(());
        }
        *self.state.write().await = ProviderState::Initializing;

        let key = self.key()?.to_string();
        if !self.validate_api_key(&key) {
            *self.state.write().await = ProviderState::Error;
            return Err(InferenceError::InvalidKey(
                "key does not look like a Claude key (sk-ant-...)".to_string(),
            ));
        }

        if let Err(e) = self.verify_key(&key).await {
            *self.state.write().await = ProviderState::Error;
            return Err(e);
        }

        *self.state.write().await = ProviderState::Ready;
        log::info!("Claude provider initialized with model {}", self.model);
        Ok(())
    }

    async fn generate_reply(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<InferenceResponse, InferenceError> {
        if !self.is_ready().await {
            return Err(InferenceError::NotInitialized);
        }
        let key = self.key()?.to_string();
        let started = std::time::Instant::now();

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: system_prompt.to_string(),
            messages: vec![UserMessage {
                role: "user",
                content: user_prompt.to_string(),
            }],
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/messages", API_BASE))
            .header("x-api-key", key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_message(&e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let messages: MessagesResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

        let content = messages
            .content
            .iter()
            .find_map(|block| block.text.clone())
            .ok_or_else(|| InferenceError::InvalidResponse("no text block".to_string()))?;

        let tokens_used = messages.usage.as_ref().map(|u| {
            u.input_tokens.unwrap_or(0) + u.output_tokens.unwrap_or(0)
        });

        Ok(InferenceResponse {
            reply: clean_reply(&content),
            provider: self.provider_type().to_string(),
            model: messages.model,
            tokens_used,
            latency_ms: Some(started.elapsed().as_millis() as u64),
        })
    }

    async fn dispose(&self) -> Result<(), InferenceError> {
        *self.state.write().await = ProviderState::Disposed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_api_key_heuristics() {
        let provider = ClaudeProvider::new(ProviderConfig::default());
        assert!(provider.validate_api_key("sk-ant-REDACTED"));
        assert!(!provider.validate_api_key("sk-ant-x"));
        assert!(!provider.validate_api_key("sk-0123456789abcdef0123456789abcdef"));
    }

    #[tokio::test]
    async fn test_initialize_without_key_fails() {
        let provider = ClaudeProvider::new(ProviderConfig::default());
        let err = provider.initialize().await.unwrap_err();
        assert!(matches!(err, InferenceError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_generate_before_initialize_fails() {
        let provider = ClaudeProvider::new(ProviderConfig {
            api_key: Some("sk-ant-REDACTED".to_string()),
            ..Default::default()
        });
        let err = provider.generate_reply("sys", "user").await.unwrap_err();
        assert_eq!(err, InferenceError::NotInitialized);
    }
}
