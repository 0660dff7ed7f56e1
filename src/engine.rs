//! Engine lifecycle manager
//!
//! Owns the single active provider instance. Initialization is single-flight:
//! one caller runs the bootstrap, everyone else waits on a notification with a
//! bounded timeout and converges on the same instance. Generation requests
//! always produce usable text; failures are masked with canned replies plus a
//! diagnostic marker.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;

use crate::catalog;
use crate::error::InferenceError;
use crate::messages::{EngineRequest, EngineResponse, EngineStatus, ReplyOutcome};
use crate::prompts::{PromptSet, PromptStore};
use crate::provider::{InferenceProvider, ProviderConfig};
use crate::registry::ProviderRegistry;

/// Upper bound on waiting for an initialization another caller started
const INIT_WAIT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(45);

/// Heartbeat period; keeps the hosting background process alive during long
/// model loads, no semantic effect on provider state
const HEARTBEAT_PERIOD: std::time::Duration = std::time::Duration::from_secs(20);

/// Pre-authored replies substituted when generation is unavailable
static FALLBACK_REPLIES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Thanks for sharing this, really interesting perspective!",
        "Great post, appreciate you putting this together.",
        "This is a helpful take, thanks for writing it up.",
        "Interesting point, definitely worth thinking about.",
    ]
});

struct EngineSlot {
    provider: Option<Arc<dyn InferenceProvider>>,
    initializing: bool,
}

struct EngineInner {
    registry: Arc<ProviderRegistry>,
    prompts: PromptStore,
    slot: Mutex<EngineSlot>,
    init_done: Notify,
    selected_model: RwLock<Option<String>>,
    fallback_cursor: AtomicUsize,
    heartbeat: std::sync::Mutex<Option<JoinHandle<()>>>,
    init_wait_timeout: std::time::Duration,
}

/// Cheap-to-clone handle owning the engine state
pub struct EngineLifecycleManager {
    inner: Arc<EngineInner>,
}

impl Clone for EngineLifecycleManager {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl EngineLifecycleManager {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self::with_init_wait(registry, INIT_WAIT_TIMEOUT)
    }

    /// Configurable wait bound for the in-progress-initialization case
    pub fn with_init_wait(
        registry: Arc<ProviderRegistry>,
        init_wait_timeout: std::time::Duration,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                registry,
                prompts: PromptStore::new(),
                slot: Mutex::new(EngineSlot {
                    provider: None,
                    initializing: false,
                }),
                init_done: Notify::new(),
                selected_model: RwLock::new(None),
                fallback_cursor: AtomicUsize::new(0),
                heartbeat: std::sync::Mutex::new(None),
                init_wait_timeout,
            }),
        }
    }

    pub fn prompts(&self) -> &PromptStore {
        &self.inner.prompts
    }

    /// Return a ready provider, bootstrapping one if needed.
    ///
    /// At most one bootstrap runs at a time; concurrent callers wait for it
    /// and receive the same instance. The wait is bounded: exceeding it is a
    /// reported failure, never a hang.
    pub async fn ensure_engine(&self) -> Result<Arc<dyn InferenceProvider>, InferenceError> {
        self.inner.ensure_engine().await
    }

    pub async fn generate(&self, post_content: &str) -> ReplyOutcome {
        self.generate_with_signals(post_content, &[]).await
    }

    /// Generate a reply, substituting a canned one whenever a real generation
    /// is not possible. The caller always receives usable text.
    pub async fn generate_with_signals(
        &self,
        post_content: &str,
        top_signals: &[String],
    ) -> ReplyOutcome {
        let (provider, initializing) = {
            let slot = self.inner.slot.lock().await;
            (slot.provider.clone(), slot.initializing)
        };

        if let Some(provider) = provider {
            let prompts = self.inner.prompts.get().await;
            let user_prompt = build_user_prompt(post_content, top_signals, &prompts);
            match provider
                .generate_reply(&prompts.system_prompt, &user_prompt)
                .await
            {
                Ok(response) => {
                    return ReplyOutcome {
                        reply: response.reply,
                        provider: Some(response.provider),
                        model: Some(response.model),
                        is_fallback: false,
                        is_initializing: false,
                        error: None,
                        tokens_used: response.tokens_used,
                        latency_ms: response.latency_ms,
                    };
                }
                Err(e) => {
                    log::error!("Generation failed: {}", e);
                    return self.inner.fallback_outcome(false, Some(e.to_string()));
                }
            }
        }

        if initializing {
            return self.inner.fallback_outcome(true, None);
        }

        // No engine yet: kick off a background bootstrap and answer with a
        // placeholder so the caller is never left waiting on a model load
        self.spawn_background_init();
        self.inner.fallback_outcome(true, None)
    }

    fn spawn_background_init(&self) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.ensure_engine().await {
                log::error!("Background engine initialization failed: {}", e);
            }
        });
    }

    pub async fn status(&self) -> EngineStatus {
        self.inner.status().await
    }

    /// Switch the preferred local model, disposing the current provider and
    /// re-initializing. The id must be a catalog member.
    pub async fn update_model(&self, model_id: &str) -> Result<(), InferenceError> {
        self.inner.update_model(model_id).await
    }

    /// Dispatch one tagged request
    pub async fn handle_request(&self, request: EngineRequest) -> EngineResponse {
        match request {
            EngineRequest::Generate { post_content } => {
                EngineResponse::Reply(self.generate(&post_content).await)
            }
            EngineRequest::GenerateWithContext {
                post_content,
                top_signals,
            } => EngineResponse::Reply(self.generate_with_signals(&post_content, &top_signals).await),
            EngineRequest::CheckEngineStatus => EngineResponse::Status(self.status().await),
            EngineRequest::GetPrompts => EngineResponse::Prompts(self.inner.prompts.get().await),
            EngineRequest::SavePrompts { prompts } => {
                self.inner.prompts.save(prompts).await;
                EngineResponse::Ack
            }
            EngineRequest::ResetPrompts => {
                EngineResponse::Prompts(self.inner.prompts.reset().await)
            }
            EngineRequest::InitializeModel => match self.ensure_engine().await {
                Ok(_) => EngineResponse::Ack,
                Err(e) => EngineResponse::Error {
                    error: e.to_string(),
                    fallback: None,
                },
            },
            EngineRequest::UpdateModel { model_id } => match self.update_model(&model_id).await {
                Ok(()) => EngineResponse::Ack,
                Err(e) => EngineResponse::Error {
                    error: e.to_string(),
                    fallback: None,
                },
            },
        }
    }

    /// Dispose the active provider and stop the heartbeat
    pub async fn shutdown(&self) -> Result<(), InferenceError> {
        self.inner.shutdown().await
    }
}

impl EngineInner {
    async fn ensure_engine(&self) -> Result<Arc<dyn InferenceProvider>, InferenceError> {
        {
            let mut slot = self.slot.lock().await;
            if let Some(provider) = &slot.provider {
                return Ok(provider.clone());
            }
            if !slot.initializing {
                slot.initializing = true;
                drop(slot);
                return self.run_initialization().await;
            }
        }

        // Someone else is bootstrapping; attach to the shared outcome
        let wait = async {
            loop {
                let notified = self.init_done.notified();
                {
                    let slot = self.slot.lock().await;
                    if !slot.initializing {
                        return slot.provider.clone();
                    }
                }
                notified.await;
            }
        };

        match tokio::time::timeout(self.init_wait_timeout, wait).await {
            Ok(Some(provider)) => Ok(provider),
            Ok(None) => Err(InferenceError::ProviderDown(
                "engine initialization failed".to_string(),
            )),
            Err(_) => Err(InferenceError::ProviderDown(format!(
                "timed out after {:?} waiting for engine initialization",
                self.init_wait_timeout
            ))),
        }
    }

    /// Runs with the initializing flag held; clears it on every exit path.
    async fn run_initialization(&self) -> Result<Arc<dyn InferenceProvider>, InferenceError> {
        self.ensure_heartbeat();

        let selected = self.selected_model.read().await.clone();
        let first_try = self.bootstrap_provider(selected, false).await;

        let result = match first_try {
            Ok(provider) => Ok(provider),
            Err(first_err) => {
                // One extra attempt pinned to the smallest catalog candidate;
                // the first pass already walked the full chain
                let cheapest = catalog::candidate_models().last().map(|m| m.id.clone());
                log::warn!(
                    "Engine initialization failed ({}); retrying with last-resort model",
                    first_err
                );
                match self.bootstrap_provider(cheapest, true).await {
                    Ok(provider) => Ok(provider),
                    Err(e) => {
                        log::error!("Last-resort initialization failed: {}", e);
                        Err(first_err)
                    }
                }
            }
        };

        let mut slot = self.slot.lock().await;
        if let Ok(provider) = &result {
            slot.provider = Some(provider.clone());
        }
        slot.initializing = false;
        drop(slot);
        self.init_done.notify_waiters();

        result
    }

    async fn bootstrap_provider(
        &self,
        model: Option<String>,
        pin_model: bool,
    ) -> Result<Arc<dyn InferenceProvider>, InferenceError> {
        let config = ProviderConfig {
            model,
            pin_model,
            ..Default::default()
        };
        let provider = self
            .registry
            .create(self.registry.default_provider_type(), config)?;
        provider.initialize().await?;
        Ok(provider)
    }

    fn ensure_heartbeat(&self) {
        let mut guard = match self.heartbeat.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        if guard.is_some() {
            return;
        }
        *guard = Some(tokio::spawn(async {
            let mut interval = tokio::time::interval(HEARTBEAT_PERIOD);
            loop {
                interval.tick().await;
                log::debug!("engine heartbeat");
            }
        }));
    }

    fn next_fallback_reply(&self) -> &'static str {
        let index = self.fallback_cursor.fetch_add(1, Ordering::Relaxed);
        FALLBACK_REPLIES[index % FALLBACK_REPLIES.len()]
    }

    fn fallback_outcome(&self, is_initializing: bool, error: Option<String>) -> ReplyOutcome {
        ReplyOutcome {
            reply: self.next_fallback_reply().to_string(),
            provider: None,
            model: None,
            is_fallback: true,
            is_initializing,
            error,
            tokens_used: None,
            latency_ms: None,
        }
    }

    async fn status(&self) -> EngineStatus {
        let slot = self.slot.lock().await;
        match &slot.provider {
            Some(provider) => EngineStatus {
                initialized: provider.is_ready().await,
                initializing: slot.initializing,
                current_model: Some(provider.model_name().await),
            },
            None => EngineStatus {
                initialized: false,
                initializing: slot.initializing,
                current_model: None,
            },
        }
    }

    async fn update_model(&self, model_id: &str) -> Result<(), InferenceError> {
        if !catalog::is_known_model(model_id) {
            return Err(InferenceError::Other(format!(
                "unknown model id: {}",
                model_id
            )));
        }

        *self.selected_model.write().await = Some(model_id.to_string());

        let previous = {
            let mut slot = self.slot.lock().await;
            slot.provider.take()
        };
        if let Some(provider) = previous {
            provider.dispose().await?;
        }

        self.ensure_engine().await.map(|_| ())
    }

    async fn shutdown(&self) -> Result<(), InferenceError> {
        if let Ok(mut guard) = self.heartbeat.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }

        let previous = {
            let mut slot = self.slot.lock().await;
            slot.provider.take()
        };
        if let Some(provider) = previous {
            provider.dispose().await?;
        }
        Ok(())
    }
}

/// Assemble the user prompt from the post, ranked context signals, and the
/// stored guidelines
fn build_user_prompt(post_content: &str, top_signals: &[String], prompts: &PromptSet) -> String {
    let mut prompt = format!("Post:\n{}\n", post_content);
    if !top_signals.is_empty() {
        prompt.push_str("\nKey signals:\n");
        for signal in top_signals {
            prompt.push_str(&format!("- {}\n", signal));
        }
    }
    prompt.push_str(&format!("\nGuidelines: {}\n", prompts.reply_guidelines));
    prompt.push_str("Write the reply now.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryStore, ModelCacheManager, ModelShard};
    use crate::provider::StreamCallback;
    use crate::providers::backend::{
        EngineLoader, EngineSession, GenerationParams, GenerationUsage,
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;

    /// Loader with a configurable delay and failure switch, counting loads
    struct TestLoader {
        delay: std::time::Duration,
        fail: bool,
        loads: AtomicUsize,
    }

    impl TestLoader {
        fn instant() -> Self {
            Self {
                delay: std::time::Duration::ZERO,
                fail: false,
                loads: AtomicUsize::new(0),
            }
        }

        fn slow(delay_ms: u64) -> Self {
            Self {
                delay: std::time::Duration::from_millis(delay_ms),
                fail: false,
                loads: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                delay: std::time::Duration::ZERO,
                fail: true,
                loads: AtomicUsize::new(0),
            }
        }
    }

    struct CannedSession;

    #[async_trait]
    impl EngineSession for CannedSession {
        async fn generate(
            &self,
            _system_prompt: &str,
            _user_prompt: &str,
            _params: &GenerationParams,
            on_token: StreamCallback,
            _cancel: Option<CancellationToken>,
        ) -> Result<GenerationUsage, InferenceError> {
            on_token("Congrats on the milestone!".to_string());
            Ok(GenerationUsage::default())
        }
    }

    #[async_trait]
    impl EngineLoader for TestLoader {
        async fn load(
            &self,
            model_id: &str,
            _shards: &[ModelShard],
        ) -> Result<Box<dyn EngineSession>, InferenceError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(InferenceError::Other(format!("{} failed", model_id)));
            }
            Ok(Box::new(CannedSession))
        }
    }

    /// Seed cached shards for every catalog model so tests never download
    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for model in catalog::candidate_models() {
            let cache = ModelCacheManager::with_key(store.clone(), &model.id);
            let shards = vec![ModelShard::new(
                model.shard_urls[0].clone(),
                Bytes::from_static(b"gguf"),
                None,
            )];
            cache.cache_model(&shards).await.unwrap();
        }
        store
    }

    async fn manager_with(loader: Arc<TestLoader>) -> EngineLifecycleManager {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = seeded_store().await;
        let registry = Arc::new(ProviderRegistry::new(loader, store));
        EngineLifecycleManager::new(registry)
    }

    #[tokio::test]
    async fn test_concurrent_ensure_single_bootstrap() {
        let loader = Arc::new(TestLoader::slow(50));
        let manager = manager_with(loader.clone()).await;

        let (a, b, c) = tokio::join!(
            manager.ensure_engine(),
            manager.ensure_engine(),
            manager.ensure_engine()
        );
        let a = a.unwrap();
        let b = b.unwrap();
        let c = c.unwrap();

        // Exactly one underlying construction, all callers share it
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
    }

    #[tokio::test]
    async fn test_wait_for_init_times_out() {
        let loader = Arc::new(TestLoader::slow(5_000));
        let store = seeded_store().await;
        let registry = Arc::new(ProviderRegistry::new(loader, store));
        let manager = EngineLifecycleManager::with_init_wait(
            registry,
            std::time::Duration::from_millis(50),
        );

        let background = manager.clone();
        tokio::spawn(async move {
            let _ = background.ensure_engine().await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let err = manager.ensure_engine().await.unwrap_err();
        assert!(matches!(err, InferenceError::ProviderDown(_)));
    }

    #[tokio::test]
    async fn test_generate_during_init_returns_annotated_fallback() {
        let loader = Arc::new(TestLoader::slow(200));
        let manager = manager_with(loader).await;

        let background = manager.clone();
        tokio::spawn(async move {
            let _ = background.ensure_engine().await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let outcome = manager.generate("Big launch today!").await;
        assert!(outcome.is_fallback);
        assert!(outcome.is_initializing);
        assert!(FALLBACK_REPLIES.contains(&outcome.reply.as_str()));
    }

    #[tokio::test]
    async fn test_generate_with_no_engine_kicks_background_init() {
        let loader = Arc::new(TestLoader::slow(50));
        let manager = manager_with(loader.clone()).await;

        let outcome = manager.generate("Post").await;
        assert!(outcome.is_fallback);
        assert!(outcome.is_initializing);

        // The background bootstrap it spawned eventually lands
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        let status = manager.status().await;
        assert!(status.initialized);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generate_after_init_returns_real_reply() {
        let loader = Arc::new(TestLoader::instant());
        let manager = manager_with(loader).await;
        manager.ensure_engine().await.unwrap();

        let outcome = manager
            .generate_with_signals("Post", &["signal-a".to_string()])
            .await;
        assert!(!outcome.is_fallback);
        assert!(!outcome.is_initializing);
        assert_eq!(outcome.reply, "Congrats on the milestone!");
        assert_eq!(outcome.provider.as_deref(), Some("local"));
    }

    #[tokio::test]
    async fn test_exhausted_bootstrap_includes_last_resort_retry() {
        let loader = Arc::new(TestLoader::failing());
        let manager = manager_with(loader.clone()).await;

        let err = manager.ensure_engine().await.unwrap_err();
        assert!(matches!(err, InferenceError::ProviderDown(_)));

        // Full chain, then exactly one pinned attempt with the cheapest
        // candidate
        assert_eq!(
            loader.loads.load(Ordering::SeqCst),
            catalog::candidate_models().len() + 1
        );

        // The failed bootstrap released the single-flight flag
        assert!(!manager.status().await.initializing);
    }

    #[tokio::test]
    async fn test_update_model_switches_and_disposes() {
        let loader = Arc::new(TestLoader::instant());
        let manager = manager_with(loader).await;
        manager.ensure_engine().await.unwrap();

        manager.update_model("llama-3.2-1b-instruct-q4").await.unwrap();
        let status = manager.status().await;
        assert!(status.initialized);
        assert_eq!(
            status.current_model.as_deref(),
            Some("llama-3.2-1b-instruct-q4")
        );
    }

    #[tokio::test]
    async fn test_update_model_rejects_unknown_id() {
        let loader = Arc::new(TestLoader::instant());
        let manager = manager_with(loader).await;
        let err = manager.update_model("not-a-model").await.unwrap_err();
        assert!(matches!(err, InferenceError::Other(_)));
    }

    #[tokio::test]
    async fn test_request_dispatch() {
        let loader = Arc::new(TestLoader::instant());
        let manager = manager_with(loader).await;

        let response = manager.handle_request(EngineRequest::CheckEngineStatus).await;
        assert!(matches!(response, EngineResponse::Status(_)));

        let response = manager.handle_request(EngineRequest::GetPrompts).await;
        assert!(matches!(response, EngineResponse::Prompts(_)));

        let response = manager
            .handle_request(EngineRequest::SavePrompts {
                prompts: PromptSet {
                    system_prompt: "x".to_string(),
                    reply_guidelines: "y".to_string(),
                },
            })
            .await;
        assert!(matches!(response, EngineResponse::Ack));

        let response = manager.handle_request(EngineRequest::ResetPrompts).await;
        match response {
            EngineResponse::Prompts(prompts) => assert_eq!(prompts, PromptSet::default()),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fallback_replies_rotate() {
        let loader = Arc::new(TestLoader::failing());
        let manager = manager_with(loader).await;

        let first = manager.inner.fallback_outcome(false, None).reply;
        let second = manager.inner.fallback_outcome(false, None).reply;
        assert_ne!(first, second);
    }

    #[test]
    fn test_build_user_prompt_includes_signals() {
        let prompts = PromptSet::default();
        let prompt = build_user_prompt(
            "We hit 1k users",
            &["growth".to_string(), "startup".to_string()],
            &prompts,
        );
        assert!(prompt.contains("We hit 1k users"));
        assert!(prompt.contains("- growth"));
        assert!(prompt.contains(&prompts.reply_guidelines));
    }
}
