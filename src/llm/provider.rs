use async_trait::async_trait;

use crate::core::errors::EngineError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "gemini", "openai")
    fn name(&self) -> &str;

    /// check if the provider is healthy/reachable
    async fn health_check(&self) -> Result<bool, EngineError>;

    /// generate embeddings, one vector per input
    ///
    /// Every returned vector has exactly the configured dimension;
    /// anything else is an `EmbeddingService` error, never a short vector.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError>;

    /// single-prompt completion (non-streaming)
    ///
    /// An empty completion is a `GenerationService` error; callers never
    /// have to tell a blank answer apart from a failure.
    async fn generate(&self, prompt: &str) -> Result<String, EngineError>;
}
