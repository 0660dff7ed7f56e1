//! Request/response contract between the engine and its callers
//!
//! Transport-agnostic: the UI layer serializes these over whatever channel it
//! has. Adding an action is a compile-time-checked variant addition.

use serde::{Deserialize, Serialize};

use crate::prompts::PromptSet;

/// Tagged request from a caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum EngineRequest {
    Generate {
        post_content: String,
    },
    GenerateWithContext {
        post_content: String,
        top_signals: Vec<String>,
    },
    CheckEngineStatus,
    GetPrompts,
    SavePrompts {
        prompts: PromptSet,
    },
    ResetPrompts,
    InitializeModel,
    UpdateModel {
        model_id: String,
    },
}

/// Tagged response back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineResponse {
    Reply(ReplyOutcome),
    Status(EngineStatus),
    Prompts(PromptSet),
    Ack,
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        fallback: Option<String>,
    },
}

/// A generated (or substituted) reply with its provenance markers.
///
/// `reply` is always usable text: when generation fails the orchestrator
/// substitutes a canned sentence and sets `is_fallback`, relegating the
/// failure detail to `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyOutcome {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub is_fallback: bool,
    pub is_initializing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Engine state snapshot for status polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub initialized: bool,
    pub initializing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_model: Option<String>,
}
