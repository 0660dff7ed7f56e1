//! Engine backend seam for the local provider
//!
//! The concrete token generator (GPU/CPU runtime) lives behind these traits so
//! the embedding host can bind whichever runtime the platform offers. The
//! provider only cares about turning shards into a session and a session into
//! a token stream.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::cache::ModelShard;
use crate::error::InferenceError;
use crate::provider::StreamCallback;

/// Sampling parameters handed to the engine per generation
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.7,
        }
    }
}

/// Token accounting reported by the engine after a generation completes
#[derive(Debug, Clone, Default)]
pub struct GenerationUsage {
    pub tokens_used: Option<u32>,
}

/// Materializes an engine session from model shards
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(
        &self,
        model_id: &str,
        shards: &[ModelShard],
    ) -> Result<Box<dyn EngineSession>, InferenceError>;
}

/// A loaded model ready to generate
#[async_trait]
pub trait EngineSession: Send + Sync {
    /// Stream token fragments through `on_token`; resolves once generation
    /// finishes or the cancel token fires.
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: &GenerationParams,
        on_token: StreamCallback,
        cancel: Option<CancellationToken>,
    ) -> Result<GenerationUsage, InferenceError>;
}
