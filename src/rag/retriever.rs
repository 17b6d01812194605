//! Similarity retrieval: embed the question, then search the store.

use std::sync::Arc;

use super::store::{ActivityStore, RetrievedActivity};
use crate::core::errors::EngineError;
use crate::llm::LlmProvider;

#[derive(Clone)]
pub struct Retriever {
    provider: Arc<dyn LlmProvider>,
    store: Arc<dyn ActivityStore>,
}

impl Retriever {
    pub fn new(provider: Arc<dyn LlmProvider>, store: Arc<dyn ActivityStore>) -> Self {
        Self { provider, store }
    }

    /// Embed `question` and return its k nearest fragments.
    ///
    /// `owner` narrows the candidates to one user's fragments; `None`
    /// searches the whole corpus. An empty store yields an empty list,
    /// not an error.
    pub async fn retrieve(
        &self,
        question: &str,
        k: usize,
        owner: Option<i64>,
    ) -> Result<Vec<RetrievedActivity>, EngineError> {
        let question = question.trim().to_string();
        let embeddings = self.provider.embed(std::slice::from_ref(&question)).await?;

        let Some(query_embedding) = embeddings.first() else {
            return Err(EngineError::EmbeddingService(
                "embedding response was empty".to_string(),
            ));
        };

        self.store.top_k_by_vector(query_embedding, k, owner).await
    }
}
