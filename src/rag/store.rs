//! ActivityStore trait — abstract interface for the activity vector store.
//!
//! Provides a clean abstraction over the embedding storage for the query
//! engine and the indexing pipeline. The primary implementation is
//! `SqliteActivityStore` in the `sqlite` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::EngineError;

/// A fragment of user data indexed for retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Row id; also the deterministic tie-break for equal similarity.
    pub id: i64,
    /// Owning user id, if any.
    pub owner: Option<i64>,
    /// Kind of the originating record ("todo", "jadwal_matkul", "ukm", ...).
    pub source_kind: String,
    /// Id of the originating record, if any.
    pub source_id: Option<String>,
    /// The original fragment text.
    pub text: String,
    /// The embedding vector, exactly the store's configured dimension.
    pub embedding: Vec<f32>,
    /// RFC 3339 creation time.
    pub created_at: String,
}

/// A new fragment to store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActivity {
    pub owner: Option<i64>,
    pub source_kind: String,
    pub source_id: Option<String>,
    pub text: String,
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedActivity {
    pub record: ActivityRecord,
    /// Cosine similarity (higher = closer).
    pub score: f32,
}

/// Abstract trait for activity vector storage.
///
/// Implementations must keep record ids stable and enforce the configured
/// embedding dimension on every write and query.
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Insert a fragment with its embedding, returning the stored record.
    async fn insert(
        &self,
        activity: NewActivity,
        embedding: Vec<f32>,
    ) -> Result<ActivityRecord, EngineError>;

    /// Insert, replacing any earlier fragment from the same source.
    ///
    /// Keyed on (source_kind, source_id) so re-indexing an updated record
    /// never leaves stale duplicates behind. Falls back to a plain insert
    /// when the activity has no source_id.
    async fn upsert_by_source(
        &self,
        activity: NewActivity,
        embedding: Vec<f32>,
    ) -> Result<ActivityRecord, EngineError>;

    /// Delete a fragment by id. Returns false when no such row exists.
    async fn delete_by_id(&self, id: i64) -> Result<bool, EngineError>;

    /// Fetch one fragment by id.
    async fn get(&self, id: i64) -> Result<Option<ActivityRecord>, EngineError>;

    /// The k nearest fragments by cosine similarity, nearest first.
    ///
    /// Ties are broken by ascending id so results are deterministic. With
    /// `owner` set only that user's fragments are considered. Fewer than k
    /// stored fragments return everything, still ordered; an empty store
    /// returns an empty list.
    async fn top_k_by_vector(
        &self,
        query: &[f32],
        k: usize,
        owner: Option<i64>,
    ) -> Result<Vec<RetrievedActivity>, EngineError>;

    /// List fragments ordered by id, with offset/limit paging.
    /// A non-positive limit returns everything.
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<ActivityRecord>, EngineError>;

    /// List one user's fragments ordered by id, with offset/limit paging.
    /// A non-positive limit returns everything.
    async fn list_by_owner(
        &self,
        owner: i64,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ActivityRecord>, EngineError>;

    /// Total fragment count.
    async fn count(&self) -> Result<usize, EngineError>;
}
