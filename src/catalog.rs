//! Curated local model catalog
//!
//! The fallback chain for the local provider: balanced default first, the
//! smallest/most-compatible build last. The local provider never loads a model
//! that is not listed here.

use serde::{Deserialize, Serialize};

/// A model the local engine knows how to load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModelSpec {
    /// Model identifier (stable across releases)
    pub id: String,
    /// Human-readable name
    pub name: String,
    pub description: String,
    /// Ordered shard URLs; downloaded sequentially
    pub shard_urls: Vec<String>,
    /// Approximate total size in bytes, for UI display
    pub approx_size_bytes: u64,
    pub context_length: u32,
}

/// Candidate models in fallback order
pub fn candidate_models() -> Vec<LocalModelSpec> {
    vec![
        LocalModelSpec {
            id: "qwen2.5-1.5b-instruct-q4".to_string(),
            name: "Qwen 2.5 1.5B Instruct".to_string(),
            description: "Balanced default: good reply quality at a moderate footprint".to_string(),
            shard_urls: vec![
                "https://huggingface.co/Qwen/Qwen2.5-1.5B-Instruct-GGUF/resolve/main/qwen2.5-1.5b-instruct-q4_k_m-00001-of-00002.gguf".to_string(),
                "https://huggingface.co/Qwen/Qwen2.5-1.5B-Instruct-GGUF/resolve/main/qwen2.5-1.5b-instruct-q4_k_m-00002-of-00002.gguf".to_string(),
            ],
            approx_size_bytes: 1_117_000_000,
            context_length: 32_768,
        },
        LocalModelSpec {
            id: "llama-3.2-1b-instruct-q4".to_string(),
            name: "Llama 3.2 1B Instruct".to_string(),
            description: "Smaller fallback with wide hardware compatibility".to_string(),
            shard_urls: vec![
                "https://huggingface.co/bartowski/Llama-3.2-1B-Instruct-GGUF/resolve/main/Llama-3.2-1B-Instruct-Q4_K_M.gguf".to_string(),
            ],
            approx_size_bytes: 808_000_000,
            context_length: 131_072,
        },
        LocalModelSpec {
            id: "smollm2-360m-instruct-q8".to_string(),
            name: "SmolLM2 360M Instruct".to_string(),
            description: "Last-resort model for constrained machines".to_string(),
            shard_urls: vec![
                "https://huggingface.co/HuggingFaceTB/SmolLM2-360M-Instruct-GGUF/resolve/main/smollm2-360m-instruct-q8_0.gguf".to_string(),
            ],
            approx_size_bytes: 386_000_000,
            context_length: 8_192,
        },
    ]
}

/// Look up a catalog entry by id
pub fn find_model(model_id: &str) -> Option<LocalModelSpec> {
    candidate_models().into_iter().find(|m| m.id == model_id)
}

/// Whether `model_id` is a member of the curated candidate list
pub fn is_known_model(model_id: &str) -> bool {
    find_model(model_id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_non_empty_and_ordered() {
        let models = candidate_models();
        assert!(models.len() >= 2);
        // Last entry is the smallest (last-resort) build
        let last = models.last().unwrap();
        assert!(models.iter().all(|m| m.approx_size_bytes >= last.approx_size_bytes));
    }

    #[test]
    fn test_find_model() {
        assert!(find_model("smollm2-360m-instruct-q8").is_some());
        assert!(find_model("made-up-model").is_none());
    }

    #[test]
    fn test_every_model_has_shards() {
        for model in candidate_models() {
            assert!(!model.shard_urls.is_empty(), "{} has no shards", model.id);
        }
    }
}
