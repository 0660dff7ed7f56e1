//! Provider variants
//!
//! - local.rs: in-process engine with the candidate fallback chain
//! - backend.rs: engine loader/session seam the host binds a runtime to
//! - openai.rs / claude.rs / gemini.rs: hosted API backends

pub mod backend;
pub mod claude;
pub mod gemini;
pub mod local;
pub mod openai;

pub use backend::{EngineLoader, EngineSession, GenerationParams, GenerationUsage};
pub use claude::ClaudeProvider;
pub use gemini::GeminiProvider;
pub use local::LocalProvider;
pub use openai::OpenAiProvider;
