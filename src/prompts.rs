//! Prompt store
//!
//! Holds the system prompt and reply guidelines the orchestrator feeds to
//! providers. Prompt content is opaque to the engine; this store only
//! persists and resets it.

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

const DEFAULT_SYSTEM_PROMPT: &str = "You draft short, friendly social-media replies. \
Match the tone of the post, stay under 40 words, and never use hashtags.";

const DEFAULT_REPLY_GUIDELINES: &str = "Acknowledge the author's point, add one concrete \
thought of your own, and end without a question unless the post asks for opinions.";

/// The editable prompt pair
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptSet {
    pub system_prompt: String,
    pub reply_guidelines: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            reply_guidelines: DEFAULT_REPLY_GUIDELINES.to_string(),
        }
    }
}

/// In-memory prompt storage with defaulting reset
#[derive(Default)]
pub struct PromptStore {
    prompts: RwLock<PromptSet>,
}

impl PromptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> PromptSet {
        self.prompts.read().await.clone()
    }

    pub async fn save(&self, prompts: PromptSet) {
        *self.prompts.write().await = prompts;
    }

    pub async fn reset(&self) -> PromptSet {
        let defaults = PromptSet::default();
        *self.prompts.write().await = defaults.clone();
        defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_on_construction() {
        let store = PromptStore::new();
        assert_eq!(store.get().await, PromptSet::default());
    }

    #[tokio::test]
    async fn test_save_then_reset() {
        let store = PromptStore::new();
        let custom = PromptSet {
            system_prompt: "Be blunt.".to_string(),
            reply_guidelines: "One sentence max.".to_string(),
        };
        store.save(custom.clone()).await;
        assert_eq!(store.get().await, custom);

        let restored = store.reset().await;
        assert_eq!(restored, PromptSet::default());
        assert_eq!(store.get().await, PromptSet::default());
    }
}
