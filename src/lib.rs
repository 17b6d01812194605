//! Retrieval-augmented question answering over personal activities.
//!
//! Short text fragments (todos, course slots, club memberships, anything a
//! caller hands over) are embedded and stored; a question retrieves its
//! nearest fragments, which are folded into a generation prompt, and the
//! resulting exchange is recorded per user. The HTTP surface, sessions and
//! the domain CRUD tables live with the caller; this crate is the engine
//! underneath them.
//!
//! Entry points: [`state::AppState::initialize`] for full process wiring,
//! or compose [`engine::QueryEngine`] and [`indexer::BackgroundIndexer`]
//! from your own parts.

pub mod core;
pub mod domain;
pub mod engine;
pub mod history;
pub mod indexer;
pub mod llm;
pub mod logging;
pub mod rag;
pub mod state;

pub use crate::core::config::EngineConfig;
pub use crate::core::errors::EngineError;
pub use crate::core::paths::AppPaths;
pub use crate::engine::{AskOutcome, AskRequest, QueryEngine};
pub use crate::history::{ChatHistoryStore, ChatRole, ChatTurn};
pub use crate::indexer::{BackgroundIndexer, IndexJob, IndexerStats};
pub use crate::llm::{build_provider, GeminiProvider, LlmProvider, OpenAiCompatProvider};
pub use crate::rag::{
    ActivityRecord, ActivityStore, NewActivity, RetrievedActivity, Retriever, SqliteActivityStore,
};
pub use crate::state::AppState;
