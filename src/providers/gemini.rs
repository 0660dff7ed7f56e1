//! Gemini API provider

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::cleaner::clean_reply;
use crate::error::{classify_message, classify_status, InferenceError};
use crate::provider::{
    InferenceProvider, InferenceResponse, ProviderConfig, ProviderState, ProviderType,
};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: ContentPart,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct ContentPart {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    total_token_count: Option<u32>,
}

pub struct GeminiProvider {
    api_key: Option<String>,
    model: String,
    client: Client,
    config: ProviderConfig,
    state: RwLock<ProviderState>,
}

impl GeminiProvider {
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
        let url = format!("{}/models?key={}", API_BASE, key);
        match self.client.get(&url).send().await {
            Ok(response) => {
                let status = response.status();
                // Gemini reports a bad key as 400 with an API_KEY_INVALID detail
                if status == reqwest::StatusCode::UNAUTHORIZED
                    || status == reqwest::StatusCode::FORBIDDEN
                {
                    let body = response.text().await.unwrap_or_default();
                    return Err(classify_status(status, &body));
                }
                if status == reqwest::StatusCode::BAD_REQUEST {
                    let body = response.text().await.unwrap_or_default();
                    if body.contains("API_KEY_INVALID") {
                        return Err(InferenceError::InvalidKey(body));
                    }
                }
                Ok(())
            }
            Err(e) => {
                log::warn!("Gemini key verification probe failed (tolerated): {}", e);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl InferenceProvider for GeminiProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Gemini
    }

    fn provider_name(&self) -> &'static str {
        "Gemini"
    }

    async fn model_name(&self) -> String {
        self.model.clone()
    }

    fn validate_api_key(&self, key: &str) -> bool {
        key.starts_with("AIza") && key.len() >= 30
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
                "key does not look like a Gemini key (AIza...)".to_string(),
            ));
        }

        if let Err(e) = self.verify_key(&key).await {
            *self.state.write().await = ProviderState::Error;
            return Err(e);
        }

        *self.state.write().await = ProviderState::Ready;
        log::info!("Gemini provider initialized with model {}", self.model);
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

        let request = GenerateRequest {
            system_instruction: ContentPart {
                parts: vec![TextPart {
                    text: system_prompt.to_string(),
                }],
            },
            contents: vec![Content {
                role: "user",
                parts: vec![TextPart {
                    text: user_prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            API_BASE, self.model, key
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_message(&e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::InvalidResponse(e.to_string()))?;

        let content = generated
            .candidates
            .first()
            .and_then(|c| c.content.parts.iter().find_map(|p| p.text.clone()))
            .ok_or_else(|| InferenceError::InvalidResponse("no candidates".to_string()))?;

        Ok(InferenceResponse {
            reply: clean_reply(&content),
            provider: self.provider_type().to_string(),
            model: self.model.clone(),
            tokens_used: generated.usage_metadata.and_then(|u| u.total_token_count),
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
        let provider = GeminiProvider::new(ProviderConfig::default());
        assert!(provider.validate_api_key("AIzaSyA0123456789abcdef0123456789abc"));
        assert!(!provider.validate_api_key("AIza-short"));
        assert!(!provider.validate_api_key("sk-0123456789abcdef0123456789abcdef"));
    }

    #[tokio::test]
    async fn test_initialize_without_key_fails() {
        let provider = GeminiProvider::new(ProviderConfig::default());
        let err = provider.initialize().await.unwrap_err();
        assert!(matches!(err, InferenceError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_generate_before_initialize_fails() {
        let provider = GeminiProvider::new(ProviderConfig {
            api_key: Some("AIzaSyA0123456789abcdef0123456789abc".to_string()),
            ..Default::default()
        });
        let err = provider.generate_reply("sys", "user").await.unwrap_err();
        assert_eq!(err, InferenceError::NotInitialized);
    }
}
