//! OpenAI-compatible client.
//!
//! Works against any endpoint speaking the OpenAI REST shape (LM Studio,
//! llama.cpp server, vLLM, the hosted API): `/v1/embeddings` and
//! `/v1/chat/completions`. Local endpoints usually need no API key, so a
//! missing key environment variable just disables the auth header.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::LlmProvider;
use crate::core::config::{EmbeddingConfig, GenerationConfig, ProviderConfig};
use crate::core::errors::EngineError;

#[derive(Clone)]
pub struct OpenAiCompatProvider {
    base_url: String,
    api_key: Option<String>,
    embedding_model: String,
    generation_model: String,
    dimension: usize,
    embed_timeout: Duration,
    generate_timeout: Duration,
    max_output_tokens: Option<u32>,
    temperature: Option<f32>,
    client: Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        provider: &ProviderConfig,
        embedding: &EmbeddingConfig,
        generation: &GenerationConfig,
    ) -> Result<Self, EngineError> {
        let base_url = provider
            .base_url
            .clone()
            .ok_or_else(|| {
                EngineError::Validation(
                    "provider.base_url is required for the openai provider".to_string(),
                )
            })?
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            base_url,
            api_key: env::var(&provider.api_key_env).ok(),
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

    fn post(&self, url: &str, timeout: Duration) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(url).timeout(timeout);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn health_check(&self) -> Result<bool, EngineError> {
        let url = format!("{}/v1/models", self.base_url);
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
        let url = format!("{}/v1/embeddings", self.base_url);

        let body = json!({
            "model": self.embedding_model,
            "input": inputs,
        });

        let res = self
            .post(&url, self.embed_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::EmbeddingTimeout(self.embed_timeout.as_secs())
                } else {
                    EngineError::embedding(e)
                }
            })?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(EngineError::EmbeddingService(format!(
                "embeddings endpoint error ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(EngineError::embedding)?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vector: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vector);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(EngineError::EmbeddingService(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                embeddings.len()
            )));
        }
        for vector in &embeddings {
            if vector.len() != self.dimension {
                return Err(EngineError::EmbeddingService(format!(
                    "expected a {}-dimension embedding, got {}",
                    self.dimension,
                    vector.len()
                )));
            }
        }

        Ok(embeddings)
    }

    async fn generate(&self, prompt: &str) -> Result<String, EngineError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.generation_model,
            "messages": [ { "role": "user", "content": prompt } ],
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = self.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(max) = self.max_output_tokens {
                obj.insert("max_tokens".to_string(), json!(max));
            }
        }

        let res = self
            .post(&url, self.generate_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::GenerationTimeout(self.generate_timeout.as_secs())
                } else {
                    EngineError::generation(e)
                }
            })?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(EngineError::GenerationService(format!(
                "chat completions error ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(EngineError::generation)?;

        let answer = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        if answer.trim().is_empty() {
            return Err(EngineError::GenerationService(
                "provider returned an empty completion".to_string(),
            ));
        }

        Ok(answer)
    }
}
