// Reply Engine - Inference provider abstraction with an on-device fallback chain
//
// Core pieces:
// - A provider trait with local (in-process) and hosted (OpenAI, Claude,
//   Gemini) implementations behind one registry
// - A model shard cache with age- and version-based invalidation
// - A lifecycle manager that single-flights initialization and masks
//   failures with canned replies

pub mod cache;
pub mod catalog;
pub mod cleaner;
pub mod engine;
pub mod error;
pub mod messages;
pub mod prompts;
pub mod provider;
pub mod providers;
pub mod registry;

pub use engine::EngineLifecycleManager;
pub use error::InferenceError;
pub use messages::{EngineRequest, EngineResponse, EngineStatus, ReplyOutcome};
pub use prompts::{PromptSet, PromptStore};
pub use provider::{
    InferenceProvider, InferenceResponse, ProviderConfig, ProviderState, ProviderType,
};
pub use providers::{EngineLoader, EngineSession};
pub use registry::{ProviderMetadata, ProviderRegistry};
