//! RAG (Retrieval-Augmented Generation) module.
//!
//! This module provides:
//! - `ActivityStore` / `SqliteActivityStore`: vector storage for activity fragments
//! - `Retriever`: embeds a question and finds its nearest fragments
//! - `prompt::augment`: deterministic prompt assembly from retrieved fragments

pub mod prompt;
pub mod retriever;
pub mod sqlite;
pub mod store;

pub use retriever::Retriever;
pub use sqlite::SqliteActivityStore;
pub use store::{ActivityRecord, ActivityStore, NewActivity, RetrievedActivity};
