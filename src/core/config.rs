//! Engine configuration.
//!
//! Typed settings loaded from YAML. The file is looked up in
//! `KAWAN_CONFIG_PATH`, then `config.yml` in the user data dir, then
//! `config.yml` in the project root; a missing file means defaults.

use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::errors::EngineError;
use super::paths::AppPaths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub provider: ProviderConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
    pub indexer: IndexerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Which backend to talk to: "gemini" or "openai".
    pub kind: String,
    /// Base URL override. Required for "openai"; optional for "gemini".
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: "gemini".to_string(),
            base_url: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model identifier.
    pub model: String,
    /// Every stored and queried vector must have exactly this many components.
    pub dimension: usize,
    /// Per-request deadline in seconds.
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-004".to_string(),
            dimension: 768,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Generation model identifier.
    pub model: String,
    /// Per-request deadline in seconds.
    pub timeout_secs: u64,
    /// Optional completion length cap, passed through to the provider.
    pub max_output_tokens: Option<u32>,
    /// Optional sampling temperature, passed through to the provider.
    pub temperature: Option<f32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            timeout_secs: 60,
            max_output_tokens: None,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// How many fragments to retrieve when the caller does not say.
    pub default_top_k: usize,
    /// Hard cap on requested top_k; larger requests are clamped.
    pub max_top_k: usize,
    /// When true, questions only retrieve fragments owned by the asking
    /// user. The default keeps the corpus shared across users.
    pub owner_scoped: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 50,
            owner_scoped: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Queue slots between producers and the worker pool. A full queue
    /// drops new jobs instead of blocking the caller.
    pub queue_capacity: usize,
    /// Number of worker tasks embedding and storing fragments.
    pub workers: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            workers: 2,
        }
    }
}

impl EngineConfig {
    pub fn config_path(paths: &AppPaths) -> PathBuf {
        if let Ok(path) = env::var("KAWAN_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        paths.project_root.join("config.yml")
    }

    /// Load the config from disk, falling back to defaults when no file
    /// exists. Always validated.
    pub fn load(paths: &AppPaths) -> Result<Self, EngineError> {
        let path = Self::config_path(paths);
        if !path.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            EngineError::Validation(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            EngineError::Validation(format!("invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.provider.kind != "gemini" && self.provider.kind != "openai" {
            return Err(EngineError::Validation(format!(
                "provider.kind must be \"gemini\" or \"openai\", got {:?}",
                self.provider.kind
            )));
        }
        if self.provider.kind == "openai" && self.provider.base_url.is_none() {
            return Err(EngineError::Validation(
                "provider.base_url is required when provider.kind is \"openai\"".to_string(),
            ));
        }
        if self.embedding.dimension == 0 {
            return Err(EngineError::Validation(
                "embedding.dimension must be at least 1".to_string(),
            ));
        }
        if self.embedding.timeout_secs == 0 || self.generation.timeout_secs == 0 {
            return Err(EngineError::Validation(
                "timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.retrieval.default_top_k == 0 {
            return Err(EngineError::Validation(
                "retrieval.default_top_k must be at least 1".to_string(),
            ));
        }
        if self.retrieval.max_top_k < self.retrieval.default_top_k {
            return Err(EngineError::Validation(
                "retrieval.max_top_k must not be smaller than default_top_k".to_string(),
            ));
        }
        if self.indexer.queue_capacity == 0 {
            return Err(EngineError::Validation(
                "indexer.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.indexer.workers == 0 {
            return Err(EngineError::Validation(
                "indexer.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();

        assert_eq!(config.embedding.dimension, 768);
        assert_eq!(config.retrieval.default_top_k, 5);
        assert!(!config.retrieval.owner_scoped);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let yaml = "
embedding:
  dimension: 16
retrieval:
  owner_scoped: true
";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.embedding.dimension, 16);
        assert_eq!(config.embedding.model, "text-embedding-004");
        assert!(config.retrieval.owner_scoped);
        assert_eq!(config.indexer.workers, 2);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = EngineConfig::default();
        config.embedding.dimension = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.provider.kind = "local".to_string();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.provider.kind = "openai".to_string();
        assert!(config.validate().is_err());
        config.provider.base_url = Some("http://localhost:1234".to_string());
        config.validate().unwrap();

        let mut config = EngineConfig::default();
        config.retrieval.default_top_k = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.retrieval.max_top_k = 1;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.indexer.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn yaml_round_trip_preserves_values() {
        let mut config = EngineConfig::default();
        config.embedding.dimension = 384;
        config.generation.temperature = Some(0.2);
        config.indexer.queue_capacity = 8;

        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(parsed.embedding.dimension, 384);
        assert_eq!(parsed.generation.temperature, Some(0.2));
        assert_eq!(parsed.indexer.queue_capacity, 8);
    }
}
