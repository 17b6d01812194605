use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("embedding service error: {0}")]
    EmbeddingService(String),
    #[error("embedding request timed out after {0}s")]
    EmbeddingTimeout(u64),
    #[error("generation service error: {0}")]
    GenerationService(String),
    #[error("generation request timed out after {0}s")]
    GenerationTimeout(u64),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    Validation(String),
}

impl EngineError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        EngineError::Storage(err.to_string())
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        EngineError::EmbeddingService(err.to_string())
    }

    pub fn generation<E: std::fmt::Display>(err: E) -> Self {
        EngineError::GenerationService(err.to_string())
    }

    /// True when the failure was a deadline expiry rather than a service fault.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            EngineError::EmbeddingTimeout(_) | EngineError::GenerationTimeout(_)
        )
    }
}
