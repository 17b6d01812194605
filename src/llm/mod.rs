//! LLM provider clients.
//!
//! `LlmProvider` is the seam between the engine and the model services.
//! `GeminiProvider` talks to the Gemini REST API, `OpenAiCompatProvider`
//! to anything speaking the OpenAI shape (LM Studio, llama.cpp, vLLM).

pub mod gemini;
pub mod openai;
pub mod provider;

use std::sync::Arc;

pub use gemini::GeminiProvider;
pub use openai::OpenAiCompatProvider;
pub use provider::LlmProvider;

use crate::core::config::EngineConfig;
use crate::core::errors::EngineError;

/// Build the provider named in `provider.kind`.
pub fn build_provider(config: &EngineConfig) -> Result<Arc<dyn LlmProvider>, EngineError> {
    match config.provider.kind.as_str() {
        "gemini" => Ok(Arc::new(GeminiProvider::new(
            &config.provider,
            &config.embedding,
            &config.generation,
        )?)),
        "openai" => Ok(Arc::new(OpenAiCompatProvider::new(
            &config.provider,
            &config.embedding,
            &config.generation,
        )?)),
        other => Err(EngineError::Validation(format!(
            "unknown provider kind: {:?}",
            other
        ))),
    }
}
