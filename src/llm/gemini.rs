//! Gemini REST client.
//!
//! Talks to the Generative Language API: `models/{model}:embedContent` for
//! embeddings and `models/{model}:generateContent` for completions. The API
//! key is read from the environment variable named in the provider config.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::LlmProvider;
use crate::core::config::{EmbeddingConfig, GenerationConfig, ProviderConfig};
use crate::core::errors::EngineError;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1";

#[derive(Clone)]
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    embedding_model: String,
    generation_model: String,
    dimension: usize,
    embed_timeout: Duration,
    generate_timeout: Duration,
    max_output_tokens: Option<u32>,
    temperature: Option<f32>,
    client: Client,
}

impl GeminiProvider {
    pub fn new(
        provider: &ProviderConfig,
        embedding: &EmbeddingConfig,
        generation: &GenerationConfig,
    ) -> Result<Self, EngineError> {
        let api_key = env::var(&provider.api_key_env).map_err(|_| {
            EngineError::Validation(format!(
                "environment variable {} is not set",
                provider.api_key_env
            ))
        })?;

        let base_url = provider
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            base_url,
            api_key,
            embedding_model: embedding.model.clone(),
            generation_model: generation.model.clone(),
            dimension: embedding.dimension,
            embed_timeout: Duration::from_secs(embedding.timeout_secs),
            generate_timeout: Duration::from_secs(generation.timeout_secs),
            max_output_tokens: generation.max_output_tokens,
            temperature: generation.temperature,
            client: Client::new(),
        })
    }

    fn embed_request_error(&self, err: reqwest::Error) -> EngineError {
        if err.is_timeout() {
            EngineError::EmbeddingTimeout(self.embed_timeout.as_secs())
        } else {
            EngineError::embedding(err)
        }
    }

    fn generate_request_error(&self, err: reqwest::Error) -> EngineError {
        if err.is_timeout() {
            EngineError::GenerationTimeout(self.generate_timeout.as_secs())
        } else {
            EngineError::generation(err)
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn health_check(&self) -> Result<bool, EngineError> {
        let url = format!("{}/models?key={}", self.base_url, self.api_key);
        let res = self
            .client
            .get(&url)
            .timeout(self.embed_timeout)
            .send()
            .await;
        match res {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EngineError> {
        let url = format!(
            "{}/models/{}:embedContent?key={}",
            self.base_url, self.embedding_model, self.api_key
        );

        // The embedContent endpoint takes one text per call.
        let mut embeddings = Vec::with_capacity(inputs.len());
        for input in inputs {
            let body = json!({
                "content": { "parts": [ { "text": input } ] }
            });

            let res = self
                .client
                .post(&url)
                .timeout(self.embed_timeout)
                .json(&body)
                .send()
                .await
                .map_err(|e| self.embed_request_error(e))?;

            if !res.status().is_success() {
                let status = res.status();
                let text = res.text().await.unwrap_or_default();
                return Err(EngineError::EmbeddingService(format!(
                    "Gemini embed error ({}): {}",
                    status, text
                )));
            }

            let payload: Value = res.json().await.map_err(EngineError::embedding)?;
            let values = payload["embedding"]["values"].as_array().ok_or_else(|| {
                EngineError::EmbeddingService(
                    "Gemini embed response missing embedding.values".to_string(),
                )
            })?;

            let vector: Vec<f32> = values
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();

            if vector.len() != self.dimension {
                return Err(EngineError::EmbeddingService(format!(
                    "expected a {}-dimension embedding, got {}",
                    self.dimension,
                    vector.len()
                )));
            }

            embeddings.push(vector);
        }

        Ok(embeddings)
    }

    async fn generate(&self, prompt: &str) -> Result<String, EngineError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.generation_model, self.api_key
        );

        let mut body = json!({
            "contents": [ { "parts": [ { "text": prompt } ] } ]
        });

        let mut generation_config = serde_json::Map::new();
        if let Some(t) = self.temperature {
            generation_config.insert("temperature".to_string(), json!(t));
        }
        if let Some(max) = self.max_output_tokens {
            generation_config.insert("maxOutputTokens".to_string(), json!(max));
        }
        if !generation_config.is_empty() {
            if let Some(obj) = body.as_object_mut() {
                obj.insert(
                    "generationConfig".to_string(),
                    Value::Object(generation_config),
                );
            }
        }

        let res = self
            .client
            .post(&url)
            .timeout(self.generate_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.generate_request_error(e))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(EngineError::GenerationService(format!(
                "Gemini generate error ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(EngineError::generation)?;

        let mut answer = String::new();
        if let Some(parts) = payload["candidates"][0]["content"]["parts"].as_array() {
            for part in parts {
                if let Some(text) = part["text"].as_str() {
                    answer.push_str(text);
                }
            }
        }

        if answer.trim().is_empty() {
            return Err(EngineError::GenerationService(
                "Gemini returned an empty completion".to_string(),
            ));
        }

        Ok(answer)
    }
}
