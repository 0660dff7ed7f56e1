//! Provider registry
//!
//! Central factory for provider instances. Callers never construct variants
//! directly; the registry validates credential presence before construction
//! and exposes the metadata a settings surface needs to list backends.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{CacheStore, FileStore, ProgressCallback};
use crate::error::InferenceError;
use crate::provider::{InferenceProvider, ProviderConfig, ProviderType};
use crate::providers::{ClaudeProvider, EngineLoader, GeminiProvider, LocalProvider, OpenAiProvider};

/// Static description of a provider type for settings UIs
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProviderMetadata {
    pub name: String,
    pub requires_api_key: bool,
    pub description: String,
}

type ConstructorFn = Box<dyn Fn(ProviderConfig) -> Arc<dyn InferenceProvider> + Send + Sync>;

pub struct ProviderRegistry {
    constructors: HashMap<ProviderType, ConstructorFn>,
    metadata: HashMap<ProviderType, ProviderMetadata>,
}

impl ProviderRegistry {
    /// Registry with every built-in variant pre-registered. The local
    /// variant needs the host-bound engine loader and a cache store.
    pub fn new(loader: Arc<dyn EngineLoader>, store: Arc<dyn CacheStore>) -> Self {
        Self::with_progress(loader, store, None)
    }

    /// Like `new`, with a progress handler every constructed local provider
    /// reports shard downloads through during initialization.
    pub fn with_progress(
        loader: Arc<dyn EngineLoader>,
        store: Arc<dyn CacheStore>,
        on_progress: Option<ProgressCallback>,
    ) -> Self {
        let mut registry = Self::empty();

        registry.register(
            ProviderType::Local,
            {
                let loader = loader.clone();
                let store = store.clone();
                Box::new(move |config| {
                    let provider = LocalProvider::new(loader.clone(), store.clone(), config);
                    let provider = match &on_progress {
                        Some(cb) => provider.with_progress(cb.clone()),
                        None => provider,
                    };
                    Arc::new(provider)
                })
            },
            ProviderMetadata {
                name: "Local Engine".to_string(),
                requires_api_key: false,
                description: "On-device model with automatic download and fallback".to_string(),
            },
        );

        registry.register(
            ProviderType::OpenAi,
            Box::new(|config| Arc::new(OpenAiProvider::new(config))),
            ProviderMetadata {
                name: "OpenAI".to_string(),
                requires_api_key: true,
                description: "Hosted OpenAI chat models".to_string(),
            },
        );

        registry.register(
            ProviderType::Claude,
            Box::new(|config| Arc::new(ClaudeProvider::new(config))),
            ProviderMetadata {
                name: "Claude".to_string(),
                requires_api_key: true,
                description: "Hosted Anthropic Claude models".to_string(),
            },
        );

        registry.register(
            ProviderType::Gemini,
            Box::new(|config| Arc::new(GeminiProvider::new(config))),
            ProviderMetadata {
                name: "Gemini".to_string(),
                requires_api_key: true,
                description: "Hosted Google Gemini models".to_string(),
            },
        );

        registry
    }

    /// Registry using the default on-disk cache location
    pub fn with_default_store(loader: Arc<dyn EngineLoader>) -> Self {
        let store = Arc::new(FileStore::new(FileStore::default_dir()));
        Self::new(loader, store)
    }

    /// Registry with no variants; embedders register their own set
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Associate a constructor with a provider type. Last registration for a
    /// given type wins.
    pub fn register(
        &mut self,
        provider_type: ProviderType,
        constructor: ConstructorFn,
        metadata: ProviderMetadata,
    ) {
        self.constructors.insert(provider_type, constructor);
        self.metadata.insert(provider_type, metadata);
    }

    /// Construct a provider, validating required configuration first.
    pub fn create(
        &self,
        provider_type: ProviderType,
        config: ProviderConfig,
    ) -> Result<Arc<dyn InferenceProvider>, InferenceError> {
        let constructor = self
            .constructors
            .get(&provider_type)
            .ok_or_else(|| InferenceError::NotRegistered(provider_type.to_string()))?;

        // Credential presence is checked before the provider exists, so a
        // settings surface gets a synchronous error without touching the
        // provider's own initialize()
        if let Some(meta) = self.metadata.get(&provider_type) {
            if meta.requires_api_key
                && config.api_key.as_deref().map(str::is_empty).unwrap_or(true)
            {
                return Err(InferenceError::InvalidKey(format!(
                    "{} requires an API key",
                    provider_type
                )));
            }
        }

        Ok(constructor(config))
    }

    pub fn registered_types(&self) -> Vec<ProviderType> {
        self.constructors.keys().copied().collect()
    }

    pub fn is_available(&self, provider_type: ProviderType) -> bool {
        self.constructors.contains_key(&provider_type)
    }

    pub fn available_providers(&self) -> Vec<ProviderType> {
        self.registered_types()
    }

    pub fn provider_metadata(&self, provider_type: ProviderType) -> Option<ProviderMetadata> {
        self.metadata.get(&provider_type).cloned()
    }

    pub fn default_provider_type(&self) -> ProviderType {
        ProviderType::Local
    }

    /// Construct the default (local) provider
    pub fn create_default(&self) -> Result<Arc<dyn InferenceProvider>, InferenceError> {
        self.create(self.default_provider_type(), ProviderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryStore, ModelShard};
    use crate::providers::backend::EngineSession;
    use async_trait::async_trait;

    struct NoopLoader;

    #[async_trait]
    impl EngineLoader for NoopLoader {
        async fn load(
            &self,
            _model_id: &str,
            _shards: &[ModelShard],
        ) -> Result<Box<dyn EngineSession>, InferenceError> {
            Err(InferenceError::Other("no runtime bound".to_string()))
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(Arc::new(NoopLoader), Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_all_builtin_types_registered() {
        let registry = registry();
        for t in [
            ProviderType::Local,
            ProviderType::OpenAi,
            ProviderType::Claude,
            ProviderType::Gemini,
        ] {
            assert!(registry.is_available(t), "{} missing", t);
        }
        assert_eq!(registry.registered_types().len(), 4);
    }

    #[test]
    fn test_create_remote_without_key_fails() {
        let registry = registry();
        let err = registry
            .create(ProviderType::Claude, ProviderConfig::default())
            .unwrap_err();
        assert!(matches!(err, InferenceError::InvalidKey(_)));

        let err = registry
            .create(
                ProviderType::Claude,
                ProviderConfig {
                    api_key: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, InferenceError::InvalidKey(_)));
    }

    #[test]
    fn test_create_remote_with_key_succeeds() {
        let registry = registry();
        let provider = registry
            .create(
                ProviderType::Claude,
                ProviderConfig {
                    api_key: Some("valid-looking-key".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(provider.provider_type(), ProviderType::Claude);
    }

    #[test]
    fn test_with_progress_constructs_local_provider() {
        let on_progress: ProgressCallback = Arc::new(|_| {});
        let registry = ProviderRegistry::with_progress(
            Arc::new(NoopLoader),
            Arc::new(MemoryStore::new()),
            Some(on_progress),
        );
        let provider = registry.create_default().unwrap();
        assert_eq!(provider.provider_type(), ProviderType::Local);
    }

    #[test]
    fn test_local_requires_no_key() {
        let registry = registry();
        let provider = registry.create_default().unwrap();
        assert_eq!(provider.provider_type(), ProviderType::Local);
    }

    #[test]
    fn test_unregistered_type_fails() {
        let registry = ProviderRegistry::empty();
        let err = registry
            .create(ProviderType::Gemini, ProviderConfig::default())
            .unwrap_err();
        assert!(matches!(err, InferenceError::NotRegistered(_)));
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = registry();
        registry.register(
            ProviderType::OpenAi,
            Box::new(|config| Arc::new(OpenAiProvider::new(config))),
            ProviderMetadata {
                name: "OpenAI (custom)".to_string(),
                requires_api_key: true,
                description: String::new(),
            },
        );
        assert_eq!(
            registry.provider_metadata(ProviderType::OpenAi).unwrap().name,
            "OpenAI (custom)"
        );
        assert_eq!(registry.registered_types().len(), 4);
    }

    #[test]
    fn test_default_type_and_metadata() {
        let registry = registry();
        assert_eq!(registry.default_provider_type(), ProviderType::Local);

        let meta = registry.provider_metadata(ProviderType::Local).unwrap();
        assert!(!meta.requires_api_key);
        assert!(registry.provider_metadata(ProviderType::Gemini).unwrap().requires_api_key);
    }
}
