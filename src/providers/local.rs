//! Local engine provider
//!
//! Walks an ordered candidate list until one model materializes: check the
//! shard cache first, download on a miss, then hand the shards to the engine
//! loader. Download progress is surfaced upward as generic initialization
//! progress.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::backend::{EngineLoader, EngineSession, GenerationParams};
use crate::cache::{CacheStore, ModelCacheManager, ProgressCallback};
use crate::catalog::{self, LocalModelSpec};
use crate::cleaner::clean_reply;
use crate::error::InferenceError;
use crate::provider::{
    InferenceProvider, InferenceResponse, ProviderConfig, ProviderState, ProviderType,
};

pub struct LocalProvider {
    store: Arc<dyn CacheStore>,
    loader: Arc<dyn EngineLoader>,
    config: ProviderConfig,
    candidates: Vec<LocalModelSpec>,
    state: RwLock<ProviderState>,
    session: RwLock<Option<Box<dyn EngineSession>>>,
    active_model: RwLock<Option<String>>,
    on_progress: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl LocalProvider {
    /// Build with the full catalog as the fallback chain. When
    /// `config.model` names a catalog member it is tried first, and with
    /// `config.pin_model` it becomes the only candidate.
    pub fn new(
        loader: Arc<dyn EngineLoader>,
        store: Arc<dyn CacheStore>,
        config: ProviderConfig,
    ) -> Self {
        let mut candidates = catalog::candidate_models();
        if let Some(ref preferred) = config.model {
            if let Some(pos) = candidates.iter().position(|m| &m.id == preferred) {
                let spec = candidates.remove(pos);
                if config.pin_model {
                    candidates = vec![spec];
                } else {
                    candidates.insert(0, spec);
                }
            } else {
                log::warn!("Requested model '{}' is not in the catalog; ignoring", preferred);
            }
        }
        Self::with_candidates(loader, store, config, candidates)
    }

    /// Build with an explicit candidate chain (last-resort retries, tests)
    pub fn with_candidates(
        loader: Arc<dyn EngineLoader>,
        store: Arc<dyn CacheStore>,
        config: ProviderConfig,
        candidates: Vec<LocalModelSpec>,
    ) -> Self {
        Self {
            store,
            loader,
            config,
            candidates,
            state: RwLock::new(ProviderState::Uninitialized),
            session: RwLock::new(None),
            active_model: RwLock::new(None),
            on_progress: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a progress handler for cache downloads during initialization
    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    fn generation_params(&self) -> GenerationParams {
        let defaults = GenerationParams::default();
        GenerationParams {
            max_tokens: self.config.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.config.temperature.unwrap_or(defaults.temperature),
        }
    }

    /// Materialize one candidate: cached shards if valid, download otherwise,
    /// then load into the engine.
    async fn materialize(&self, spec: &LocalModelSpec) -> Result<Box<dyn EngineSession>, InferenceError> {
        let cache = ModelCacheManager::with_key(self.store.clone(), &spec.id);

        let shards = if cache.is_cached().await? {
            log::info!("Loading {} from cache", spec.id);
            cache.get_cached_model().await?
        } else {
            log::info!("Downloading {} ({} shards)", spec.id, spec.shard_urls.len());
            cache
                .download_and_cache(&spec.shard_urls, self.on_progress.clone())
                .await?
        };

        self.loader.load(&spec.id, &shards).await
    }
}

#[async_trait]
impl InferenceProvider for LocalProvider {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Local
    }

    fn provider_name(&self) -> &'static str {
        "Local Engine"
    }

    async fn model_name(&self) -> String {
        if let Some(active) = self.active_model.read().await.clone() {
            return active;
        }
        self.candidates
            .first()
            .map(|m| m.id.clone())
            .unwrap_or_default()
    }

    fn validate_api_key(&self, _key: &str) -> bool {
        // No credentials required for local inference
        true
    }

    async fn is_ready(&self) -> bool {
        *self.state.read().await == ProviderState::Ready
    }

    async fn initialize(&self) -> Result<(), InferenceError> {
        {
            let state = self.state.read().await;
            match *state {
                ProviderState::Ready => return Ok(()),
                ProviderState::Disposed => return Err(InferenceError::NotInitialized),
                _ => {}
            }
        }
        *self.state.write().await = ProviderState::Initializing;

        let mut last_error = InferenceError::ProviderDown("no candidate models".to_string());

        for (attempt, spec) in self.candidates.iter().enumerate() {
            match self.materialize(spec).await {
                Ok(session) => {
                    *self.session.write().await = Some(session);
                    *self.active_model.write().await = Some(spec.id.clone());
                    *self.state.write().await = ProviderState::Ready;
                    log::info!(
                        "Local engine ready with {} (candidate {}/{})",
                        spec.id,
                        attempt + 1,
                        self.candidates.len()
                    );
                    return Ok(());
                }
                Err(e) => {
                    log::warn!(
                        "Model {} failed to materialize ({}); {} candidate(s) left",
                        spec.id,
                        e,
                        self.candidates.len() - attempt - 1
                    );
                    last_error = e;
                }
            }
        }

        *self.state.write().await = ProviderState::Error;
        Err(InferenceError::ProviderDown(format!(
            "all {} candidate model(s) failed; last error: {}",
            self.candidates.len(),
            last_error
        )))
    }

    async fn generate_reply(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<InferenceResponse, InferenceError> {
        if !self.is_ready().await {
            return Err(InferenceError::NotInitialized);
        }

        let started = std::time::Instant::now();
        let params = self.generation_params();

        // Concatenate the token stream, then strip boilerplate
        let buffer = Arc::new(std::sync::Mutex::new(String::new()));
        let sink = buffer.clone();
        let on_token: crate::provider::StreamCallback = Box::new(move |fragment| {
            if let Ok(mut buf) = sink.lock() {
                buf.push_str(&fragment);
            }
        });

        let usage = {
            let guard = self.session.read().await;
            let session = guard.as_ref().ok_or(InferenceError::NotInitialized)?;
            session
                .generate(
                    system_prompt,
                    user_prompt,
                    &params,
                    on_token,
                    Some(self.cancel.child_token()),
                )
                .await?
        };

        let raw = buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default();
        let reply = clean_reply(&raw);
        let model = self.model_name().await;

        Ok(InferenceResponse {
            reply,
            provider: self.provider_type().to_string(),
            model,
            tokens_used: usage.tokens_used,
            latency_ms: Some(started.elapsed().as_millis() as u64),
        })
    }

    async fn dispose(&self) -> Result<(), InferenceError> {
        // Cancel before taking the session lock: an in-flight generation
        // holds a read guard until its session returns
        self.cancel.cancel();
        *self.session.write().await = None;
        *self.active_model.write().await = None;
        *self.state.write().await = ProviderState::Disposed;
        log::info!("Local provider disposed");
        Ok(())
    }
}
