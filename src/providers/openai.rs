//! OpenAI API provider

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::cleaner::clean_reply;
use crate::error::{classify_message, classify_status, InferenceError};
use crate::provider::{
    InferenceProvider, InferenceResponse, ProviderConfig, ProviderState, ProviderType,
};

const API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    model: String,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    total_tokens: Option<u32>,
}

pub struct OpenAiProvider {
    api_key: Option<String>,
    model: String,
    client: Client,
    config: ProviderConfig,
    state: RwLock<ProviderState>,
}

impl OpenAiProvider {
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

    /// Cheap verification request. Auth failures reclassify to `InvalidKey`;
    /// anything else is tolerated (key likely fine, service transiently
    /// unreachable) and does not block readiness.
    async fn verify_key(&self, key: &str) -> Result<(), InferenceError> {
        let url = format!("{}/models", API_BASE);
        match self.client.get(&url).bearer_auth(key).send().await {
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
                log::warn!("OpenAI key verification probe failed (tolerated): {}", e);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl InferenceProvider for OpenAiProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAi
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI"
    }

    async fn model_name(&self) -> String {
        self.model.clone()
    }

    fn validate_api_key(&self, key: &str) -> bool {
        key.starts_with("sk-") && key.len() >= 20
    }

    async fn is_ready(&self) -> bool {
        *self.state.read().await == ProviderState::Ready
    }

    async fn initialize(&self) -> Result<(), InferenceError> {
        if *self.state.read().await == ProviderState::Ready {
            return Ok(());
        }
        *self.state.write().await = ProviderState::Initializing;

        // Format check before any network activity
        let key = self.key()?.to_string();
        if !self.validate_api_key(&key) {
            *self.state.write().await = ProviderState::Error;
            return Err(InferenceError::InvalidKey(
                "key does not look like an OpenAI key (sk-...)".to_string(),
            ));
        }

        if let Err(e) = self.verify_key(&key).await {
            *self.state.write().await = ProviderState::Error;
            return Err(e);
        }

        *self.state.write().await = ProviderState::Ready;
        log::info!("OpenAI provider initialized with model {}", self.model);
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

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt.to_string(),
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", API_BASE))
            .bearer_auth(key)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_message(&e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

        let content = chat
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| {
                InferenceError::InvalidResponse("no choices in completion".to_string())
            })?;

        Ok(InferenceResponse {
            reply: clean_reply(&content),
            provider: self.provider_type().to_string(),
            model: chat.model,
            tokens_used: chat.usage.and_then(|u| u.total_tokens),
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
        let provider = OpenAiProvider::new(ProviderConfig::default());
        assert!(provider.validate_api_key("sk-0123456789abcdef0123456789"));
        assert!(!provider.validate_api_key("sk-short"));
        assert!(!provider.validate_api_key("pk-0123456789abcdef0123456789"));
        assert!(!provider.validate_api_key(""));
    }

    #[tokio::test]
    async fn test_initialize_without_key_fails_before_network() {
        let provider = OpenAiProvider::new(ProviderConfig::default());
        let err = provider.initialize().await.unwrap_err();
        assert!(matches!(err, InferenceError::InvalidKey(_)));
        assert!(!provider.is_ready().await);
    }

    #[tokio::test]
    async fn test_initialize_with_malformed_key_fails_before_network() {
        let provider = OpenAiProvider::new(ProviderConfig {
            api_key: Some("not-a-real-key".to_string()),
            ..Default::default()
        });
        let err = provider.initialize().await.unwrap_err();
        assert!(matches!(err, InferenceError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_generate_before_initialize_fails() {
        let provider = OpenAiProvider::new(ProviderConfig {
            api_key: Some("sk-0123456789abcdef0123456789".to_string()),
            ..Default::default()
        });
        let err = provider.generate_reply("sys", "user").await.unwrap_err();
        assert_eq!(err, InferenceError::NotInitialized);
    }

    #[tokio::test]
    async fn test_default_model() {
        let provider = OpenAiProvider::new(ProviderConfig::default());
        assert_eq!(provider.model_name().await, DEFAULT_MODEL);
    }
}
