//! SQLite-backed activity store implementation.
//!
//! In-process vector store using SQLite for rows and brute-force cosine
//! similarity for search. A full scan keeps small-corpus retrieval exact;
//! an approximate index can replace it behind the same trait if per-user
//! corpora outgrow a few thousand fragments.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::store::{ActivityRecord, ActivityStore, NewActivity, RetrievedActivity};
use crate::core::errors::EngineError;
use crate::core::paths::AppPaths;

pub struct SqliteActivityStore {
    pool: SqlitePool,
    dimension: usize,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteActivityStore {
    pub async fn new(paths: &AppPaths, dimension: usize) -> Result<Self, EngineError> {
        Self::with_path(paths.activities_db_path.clone(), dimension).await
    }

    pub async fn with_path(db_path: PathBuf, dimension: usize) -> Result<Self, EngineError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(EngineError::storage)?;

        let store = Self {
            pool,
            dimension,
            db_path,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), EngineError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS activities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner INTEGER,
                source_kind TEXT NOT NULL,
                source_id TEXT,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(EngineError::storage)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_activities_owner ON activities(owner)")
            .execute(&self.pool)
            .await
            .map_err(EngineError::storage)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_activities_source
             ON activities(source_kind, source_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(EngineError::storage)?;

        Ok(())
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), EngineError> {
        if embedding.len() != self.dimension {
            return Err(EngineError::Validation(format!(
                "embedding has {} components, store expects {}",
                embedding.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        let denom = norm_a * norm_b;

        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> ActivityRecord {
        let embedding_bytes: Vec<u8> = row.get("embedding");

        ActivityRecord {
            id: row.get("id"),
            owner: row.get("owner"),
            source_kind: row.get("source_kind"),
            source_id: row.get("source_id"),
            text: row.get("text"),
            embedding: Self::deserialize_embedding(&embedding_bytes),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl ActivityStore for SqliteActivityStore {
    async fn insert(
        &self,
        activity: NewActivity,
        embedding: Vec<f32>,
    ) -> Result<ActivityRecord, EngineError> {
        self.check_dimension(&embedding)?;

        let blob = Self::serialize_embedding(&embedding);
        let now = chrono::Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO activities (owner, source_kind, source_id, text, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(activity.owner)
        .bind(&activity.source_kind)
        .bind(&activity.source_id)
        .bind(&activity.text)
        .bind(&blob)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(EngineError::storage)?;

        Ok(ActivityRecord {
            id: result.last_insert_rowid(),
            owner: activity.owner,
            source_kind: activity.source_kind,
            source_id: activity.source_id,
            text: activity.text,
            embedding,
            created_at: now,
        })
    }

    async fn upsert_by_source(
        &self,
        activity: NewActivity,
        embedding: Vec<f32>,
    ) -> Result<ActivityRecord, EngineError> {
        let Some(source_id) = activity.source_id.clone() else {
            return self.insert(activity, embedding).await;
        };

        self.check_dimension(&embedding)?;

        let blob = Self::serialize_embedding(&embedding);
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(EngineError::storage)?;

        sqlx::query("DELETE FROM activities WHERE source_kind = ?1 AND source_id = ?2")
            .bind(&activity.source_kind)
            .bind(&source_id)
            .execute(&mut *tx)
            .await
            .map_err(EngineError::storage)?;

        let result = sqlx::query(
            "INSERT INTO activities (owner, source_kind, source_id, text, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(activity.owner)
        .bind(&activity.source_kind)
        .bind(&source_id)
        .bind(&activity.text)
        .bind(&blob)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(EngineError::storage)?;

        tx.commit().await.map_err(EngineError::storage)?;

        Ok(ActivityRecord {
            id: result.last_insert_rowid(),
            owner: activity.owner,
            source_kind: activity.source_kind,
            source_id: Some(source_id),
            text: activity.text,
            embedding,
            created_at: now,
        })
    }

    async fn delete_by_id(&self, id: i64) -> Result<bool, EngineError> {
        let result = sqlx::query("DELETE FROM activities WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(EngineError::storage)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: i64) -> Result<Option<ActivityRecord>, EngineError> {
        let row = sqlx::query(
            "SELECT id, owner, source_kind, source_id, text, embedding, created_at
             FROM activities
             WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(EngineError::storage)?;

        Ok(row.as_ref().map(Self::row_to_record))
    }

    async fn top_k_by_vector(
        &self,
        query: &[f32],
        k: usize,
        owner: Option<i64>,
    ) -> Result<Vec<RetrievedActivity>, EngineError> {
        if k == 0 {
            return Err(EngineError::Validation(
                "top_k must be at least 1".to_string(),
            ));
        }
        self.check_dimension(query)?;

        let rows = if let Some(owner) = owner {
            sqlx::query(
                "SELECT id, owner, source_kind, source_id, text, embedding, created_at
                 FROM activities
                 WHERE owner = ?1",
            )
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .map_err(EngineError::storage)?
        } else {
            sqlx::query(
                "SELECT id, owner, source_kind, source_id, text, embedding, created_at
                 FROM activities",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(EngineError::storage)?
        };

        let mut scored: Vec<RetrievedActivity> = rows
            .iter()
            .map(|row| {
                let record = Self::row_to_record(row);
                let score = Self::cosine_similarity(query, &record.embedding);
                RetrievedActivity { record, score }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<ActivityRecord>, EngineError> {
        let rows = if limit > 0 {
            sqlx::query(
                "SELECT id, owner, source_kind, source_id, text, embedding, created_at
                 FROM activities
                 ORDER BY id ASC
                 LIMIT ?1 OFFSET ?2",
            )
            .bind(limit)
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(EngineError::storage)?
        } else {
            sqlx::query(
                "SELECT id, owner, source_kind, source_id, text, embedding, created_at
                 FROM activities
                 ORDER BY id ASC",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(EngineError::storage)?
        };

        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn list_by_owner(
        &self,
        owner: i64,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ActivityRecord>, EngineError> {
        let rows = if limit > 0 {
            sqlx::query(
                "SELECT id, owner, source_kind, source_id, text, embedding, created_at
                 FROM activities
                 WHERE owner = ?1
                 ORDER BY id ASC
                 LIMIT ?2 OFFSET ?3",
            )
            .bind(owner)
            .bind(limit)
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(EngineError::storage)?
        } else {
            sqlx::query(
                "SELECT id, owner, source_kind, source_id, text, embedding, created_at
                 FROM activities
                 WHERE owner = ?1
                 ORDER BY id ASC",
            )
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .map_err(EngineError::storage)?
        };

        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    async fn count(&self) -> Result<usize, EngineError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM activities")
            .fetch_one(&self.pool)
            .await
            .map_err(EngineError::storage)?;

        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteActivityStore {
        let tmp = std::env::temp_dir().join(format!(
            "kawan-activities-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        SqliteActivityStore::with_path(tmp, 3).await.unwrap()
    }

    fn make_activity(owner: Option<i64>, kind: &str, source_id: Option<&str>, text: &str) -> NewActivity {
        NewActivity {
            owner,
            source_kind: kind.to_string(),
            source_id: source_id.map(|s| s.to_string()),
            text: text.to_string(),
        }
    }

    #[test]
    fn cosine_similarity_basics() {
        let identical = SqliteActivityStore::cosine_similarity(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!(identical > 0.999);

        let orthogonal = SqliteActivityStore::cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(orthogonal.abs() < 1e-6);

        assert_eq!(SqliteActivityStore::cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(SqliteActivityStore::cosine_similarity(&[], &[]), 0.0);
        assert_eq!(SqliteActivityStore::cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn insert_and_search() {
        let store = test_store().await;

        let record = store
            .insert(
                make_activity(Some(1), "todo", Some("7"), "Buy milk"),
                vec![1.0, 0.0, 0.0],
            )
            .await
            .unwrap();

        assert_eq!(record.id, 1);
        assert_eq!(record.source_kind, "todo");
        assert_eq!(store.count().await.unwrap(), 1);

        let results = store
            .top_k_by_vector(&[1.0, 0.0, 0.0], 10, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.id, 1);
        assert_eq!(results[0].record.text, "Buy milk");
        assert!(results[0].score > 0.99);

        let fetched = store.get(1).await.unwrap().unwrap();
        assert_eq!(fetched.embedding, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn search_orders_nearest_first_with_id_tie_break() {
        let store = test_store().await;

        // r1 and r2 share a vector, r3 is the exact match.
        store
            .insert(make_activity(None, "todo", None, "tie a"), vec![0.6, 0.8, 0.0])
            .await
            .unwrap();
        store
            .insert(make_activity(None, "todo", None, "tie b"), vec![0.6, 0.8, 0.0])
            .await
            .unwrap();
        store
            .insert(make_activity(None, "todo", None, "exact"), vec![1.0, 0.0, 0.0])
            .await
            .unwrap();

        let results = store
            .top_k_by_vector(&[1.0, 0.0, 0.0], 10, None)
            .await
            .unwrap();

        let ids: Vec<i64> = results.iter().map(|r| r.record.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert!(results[0].score > results[1].score);
        assert_eq!(results[1].score, results[2].score);
    }

    #[tokio::test]
    async fn search_respects_k_and_owner_filter() {
        let store = test_store().await;

        store
            .insert(make_activity(Some(1), "todo", None, "mine"), vec![1.0, 0.0, 0.0])
            .await
            .unwrap();
        store
            .insert(make_activity(Some(2), "todo", None, "theirs"), vec![1.0, 0.0, 0.0])
            .await
            .unwrap();
        store
            .insert(make_activity(None, "manual", None, "nobody's"), vec![0.0, 1.0, 0.0])
            .await
            .unwrap();

        let mine = store
            .top_k_by_vector(&[1.0, 0.0, 0.0], 10, Some(1))
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].record.text, "mine");

        // Fewer than k records is fine.
        let all = store.top_k_by_vector(&[1.0, 0.0, 0.0], 99, None).await.unwrap();
        assert_eq!(all.len(), 3);

        let top_two = store.top_k_by_vector(&[1.0, 0.0, 0.0], 2, None).await.unwrap();
        assert_eq!(top_two.len(), 2);

        let err = store.top_k_by_vector(&[1.0, 0.0, 0.0], 0, None).await;
        assert!(matches!(err, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn empty_store_returns_empty_results() {
        let store = test_store().await;
        let results = store
            .top_k_by_vector(&[1.0, 0.0, 0.0], 5, None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let store = test_store().await;

        let err = store
            .insert(make_activity(None, "todo", None, "bad"), vec![1.0, 0.0])
            .await;
        assert!(matches!(err, Err(EngineError::Validation(_))));
        assert_eq!(store.count().await.unwrap(), 0);

        let err = store.top_k_by_vector(&[1.0, 0.0, 0.0, 0.0], 5, None).await;
        assert!(matches!(err, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn delete_by_id_reports_missing_rows() {
        let store = test_store().await;

        store
            .insert(make_activity(None, "todo", None, "keep"), vec![1.0, 0.0, 0.0])
            .await
            .unwrap();
        store
            .insert(make_activity(None, "todo", None, "drop"), vec![0.0, 1.0, 0.0])
            .await
            .unwrap();

        assert!(store.delete_by_id(2).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);

        // Deleting a missing id mutates nothing.
        assert!(!store.delete_by_id(42).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.get(1).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn upsert_replaces_fragment_from_same_source() {
        let store = test_store().await;

        store
            .upsert_by_source(
                make_activity(Some(1), "todo", Some("7"), "old text"),
                vec![1.0, 0.0, 0.0],
            )
            .await
            .unwrap();
        let replaced = store
            .upsert_by_source(
                make_activity(Some(1), "todo", Some("7"), "new text"),
                vec![0.0, 1.0, 0.0],
            )
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let fetched = store.get(replaced.id).await.unwrap().unwrap();
        assert_eq!(fetched.text, "new text");
        assert_eq!(fetched.embedding, vec![0.0, 1.0, 0.0]);

        // A different source id is a different fragment.
        store
            .upsert_by_source(
                make_activity(Some(1), "todo", Some("8"), "other"),
                vec![0.0, 0.0, 1.0],
            )
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        // No source id falls back to plain inserts.
        store
            .upsert_by_source(make_activity(None, "manual", None, "a"), vec![1.0, 0.0, 0.0])
            .await
            .unwrap();
        store
            .upsert_by_source(make_activity(None, "manual", None, "b"), vec![1.0, 0.0, 0.0])
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn list_pages_in_id_order() {
        let store = test_store().await;

        for (i, owner) in [Some(1), Some(1), Some(2), None, Some(1)].iter().enumerate() {
            store
                .insert(
                    make_activity(*owner, "todo", None, &format!("item {}", i)),
                    vec![1.0, 0.0, 0.0],
                )
                .await
                .unwrap();
        }

        let first_page = store.list(0, 2).await.unwrap();
        let ids: Vec<i64> = first_page.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);

        let second_page = store.list(2, 2).await.unwrap();
        let ids: Vec<i64> = second_page.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 4]);

        // A non-positive limit means everything.
        assert_eq!(store.list(0, 0).await.unwrap().len(), 5);

        let owned = store.list_by_owner(1, 0, 10).await.unwrap();
        let ids: Vec<i64> = owned.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 5]);
    }

    #[tokio::test]
    async fn persistence_reload() {
        let tmp = std::env::temp_dir().join(format!(
            "kawan-activities-reload-{}.db",
            uuid::Uuid::new_v4()
        ));

        {
            let store = SqliteActivityStore::with_path(tmp.clone(), 3).await.unwrap();
            store
                .insert(
                    make_activity(Some(1), "jadwal_matkul", Some("2"), "Algoritma pada Senin"),
                    vec![0.0, 1.0, 0.0],
                )
                .await
                .unwrap();
        }

        let reopened = SqliteActivityStore::with_path(tmp, 3).await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);

        let results = reopened
            .top_k_by_vector(&[0.0, 1.0, 0.0], 1, None)
            .await
            .unwrap();
        assert_eq!(results[0].record.text, "Algoritma pada Senin");
    }
}
