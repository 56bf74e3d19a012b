//! LLM Provider implementations and factory
//!
//! Submodules implement specific provider families (OpenAI, Hugging Face).

pub mod huggingface;
pub mod openai;

use std::sync::Arc;

use crate::core::config::{AgentConfig, ProviderType};
use crate::llm::traits::ProviderAdapter;

use self::huggingface::HuggingFaceAdapter;
use self::openai::OpenAIAdapter;

/// Create the adapter for an agent's configured provider
pub fn create_adapter(config: &AgentConfig) -> Arc<dyn ProviderAdapter> {
    match config.provider {
        ProviderType::OpenAI => Arc::new(OpenAIAdapter::from_config(config)),
        ProviderType::HuggingFace => Arc::new(HuggingFaceAdapter::from_config(config)),
    }
}
