//! Process-wide wiring.
//!
//! One `AppState` per process: paths, configuration, the model provider,
//! both stores, the background indexer and the query engine, built in
//! dependency order. Everything in here is re-created on restart; the only
//! durable pieces are the two SQLite files the stores open.

use std::sync::Arc;

use crate::core::config::EngineConfig;
use crate::core::errors::EngineError;
use crate::core::paths::AppPaths;
use crate::engine::QueryEngine;
use crate::history::ChatHistoryStore;
use crate::indexer::BackgroundIndexer;
use crate::llm::{self, LlmProvider};
use crate::rag::{ActivityStore, SqliteActivityStore};

pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: EngineConfig,
    pub provider: Arc<dyn LlmProvider>,
    pub activities: Arc<dyn ActivityStore>,
    pub history: ChatHistoryStore,
    pub indexer: BackgroundIndexer,
    pub engine: QueryEngine,
}

impl AppState {
    /// Resolve paths, load the config from disk and wire everything up.
    ///
    /// Must run inside a Tokio runtime: the indexer workers and the startup
    /// health check are spawned tasks.
    pub async fn initialize() -> Result<Arc<Self>, EngineError> {
        let paths = Arc::new(AppPaths::new());
        let config = EngineConfig::load(&paths)?;
        Self::with_config(paths, config).await
    }

    /// Wire the state from an already loaded configuration.
    pub async fn with_config(
        paths: Arc<AppPaths>,
        config: EngineConfig,
    ) -> Result<Arc<Self>, EngineError> {
        config.validate()?;

        let activities: Arc<dyn ActivityStore> = Arc::new(
            SqliteActivityStore::new(paths.as_ref(), config.embedding.dimension).await?,
        );
        let history = ChatHistoryStore::new(paths.as_ref()).await?;
        let provider = llm::build_provider(&config)?;

        let indexer = BackgroundIndexer::start(provider.clone(), activities.clone(), &config.indexer);
        let engine = QueryEngine::new(
            provider.clone(),
            activities.clone(),
            history.clone(),
            config.retrieval.clone(),
        );

        // An unreachable provider at startup is worth a warning, not a
        // refusal to start: the stores and listings still work.
        let startup_check = provider.clone();
        tokio::spawn(async move {
            match startup_check.health_check().await {
                Ok(true) => tracing::info!("provider {} is reachable", startup_check.name()),
                Ok(false) => {
                    tracing::warn!("provider {} is not reachable at startup", startup_check.name())
                }
                Err(e) => tracing::warn!(
                    "provider {} health check failed: {}",
                    startup_check.name(),
                    e
                ),
            }
        });

        Ok(Arc::new(AppState {
            paths,
            config,
            provider,
            activities,
            history,
            indexer,
            engine,
        }))
    }
}
