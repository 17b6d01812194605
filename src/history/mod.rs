//! Per-user chat history persistence.
//!
//! Every answered question becomes two turns, user then assistant, written
//! in one transaction so a reader never sees a question without its answer.
//! Read order is (created_at, id) ascending; the id only breaks ties
//! between turns written in the same instant.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use crate::core::errors::EngineError;
use crate::core::paths::AppPaths;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(ChatRole::User),
            "assistant" => Some(ChatRole::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: i64,
    pub user_id: i64,
    pub role: ChatRole,
    pub message: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct ChatHistoryStore {
    pool: SqlitePool,
}

impl ChatHistoryStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, EngineError> {
        Self::with_path(paths.chat_db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, EngineError> {
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

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chat_turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                message TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&pool)
        .await
        .map_err(EngineError::storage)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_turns_user
             ON chat_turns(user_id, created_at)",
        )
        .execute(&pool)
        .await
        .map_err(EngineError::storage)?;

        Ok(Self { pool })
    }

    /// Append a single turn.
    pub async fn record(
        &self,
        user_id: i64,
        role: ChatRole,
        message: &str,
    ) -> Result<ChatTurn, EngineError> {
        let now = chrono::Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO chat_turns (user_id, role, message, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user_id)
        .bind(role.as_str())
        .bind(message)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(EngineError::storage)?;

        Ok(ChatTurn {
            id: result.last_insert_rowid(),
            user_id,
            role,
            message: message.to_string(),
            created_at: now,
        })
    }

    /// Append a question/answer pair in one transaction.
    ///
    /// Both turns share a timestamp; insertion order makes the user turn
    /// sort first. Either both turns land or neither does.
    pub async fn record_exchange(
        &self,
        user_id: i64,
        question: &str,
        answer: &str,
    ) -> Result<(ChatTurn, ChatTurn), EngineError> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(EngineError::storage)?;

        let user_turn = sqlx::query(
            "INSERT INTO chat_turns (user_id, role, message, created_at)
             VALUES (?1, 'user', ?2, ?3)",
        )
        .bind(user_id)
        .bind(question)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(EngineError::storage)?;

        let assistant_turn = sqlx::query(
            "INSERT INTO chat_turns (user_id, role, message, created_at)
             VALUES (?1, 'assistant', ?2, ?3)",
        )
        .bind(user_id)
        .bind(answer)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(EngineError::storage)?;

        tx.commit().await.map_err(EngineError::storage)?;

        Ok((
            ChatTurn {
                id: user_turn.last_insert_rowid(),
                user_id,
                role: ChatRole::User,
                message: question.to_string(),
                created_at: now.clone(),
            },
            ChatTurn {
                id: assistant_turn.last_insert_rowid(),
                user_id,
                role: ChatRole::Assistant,
                message: answer.to_string(),
                created_at: now,
            },
        ))
    }

    /// One user's turns, oldest first, with offset/limit paging.
    /// A non-positive limit returns everything.
    pub async fn history(
        &self,
        user_id: i64,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ChatTurn>, EngineError> {
        let rows = if limit > 0 {
            sqlx::query(
                "SELECT id, user_id, role, message, created_at
                 FROM chat_turns
                 WHERE user_id = ?1
                 ORDER BY created_at ASC, id ASC
                 LIMIT ?2 OFFSET ?3",
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(EngineError::storage)?
        } else {
            sqlx::query(
                "SELECT id, user_id, role, message, created_at
                 FROM chat_turns
                 WHERE user_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(EngineError::storage)?
        };

        Ok(rows.iter().map(Self::row_to_turn).collect())
    }

    /// One user's most recent turns, newest first.
    pub async fn recent(&self, user_id: i64, limit: i64) -> Result<Vec<ChatTurn>, EngineError> {
        let rows = sqlx::query(
            "SELECT id, user_id, role, message, created_at
             FROM chat_turns
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )
        .bind(user_id)
        .bind(limit.max(1))
        .fetch_all(&self.pool)
        .await
        .map_err(EngineError::storage)?;

        Ok(rows.iter().map(Self::row_to_turn).collect())
    }

    /// Turn count, for one user or across all users.
    pub async fn count(&self, user_id: Option<i64>) -> Result<usize, EngineError> {
        let count: i64 = if let Some(user_id) = user_id {
            sqlx::query_scalar("SELECT COUNT(*) FROM chat_turns WHERE user_id = ?1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(EngineError::storage)?
        } else {
            sqlx::query_scalar("SELECT COUNT(*) FROM chat_turns")
                .fetch_one(&self.pool)
                .await
                .map_err(EngineError::storage)?
        };

        Ok(count as usize)
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> ChatTurn {
        let role_str: String = row.get("role");

        ChatTurn {
            id: row.get("id"),
            user_id: row.get("user_id"),
            // The CHECK constraint keeps unknown roles out of the table.
            role: ChatRole::parse(&role_str).unwrap_or(ChatRole::User),
            message: row.get("message"),
            created_at: row.get("created_at"),
        }
    }
}
