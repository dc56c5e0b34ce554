// src/store/postgres.rs
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};

use super::{ChatStore, StoreError};
use crate::models::admin::TrainingSample;
use crate::models::chat::{
    ChatMessage, ChatSession, Feedback, Metrics, NewFeedback, NewMessage, Role, SessionSummary,
};

const MESSAGE_COLUMNS: &str =
    "id, session_id, user_id, role, message, score, flagged, timestamp";

const SUMMARY_SELECT: &str = "SELECT s.id, s.user_id, s.title, s.created_at,
        (SELECT COUNT(*) FROM chat_history h WHERE h.session_id = s.id) AS message_count,
        (SELECT AVG(f.reward) FROM feedback f
            JOIN chat_history h ON f.message_id = h.id
            WHERE h.session_id = s.id) AS avg_reward
     FROM chat_sessions s";

impl<'r> FromRow<'r, PgRow> for ChatMessage {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        let role = Role::parse(&role)
            .ok_or_else(|| sqlx::Error::Decode(format!("unknown message role: {}", role).into()))?;

        Ok(ChatMessage {
            id: row.try_get("id")?,
            session_id: row.try_get("session_id")?,
            user_id: row.try_get("user_id")?,
            role,
            message: row.try_get("message")?,
            score: row.try_get("score")?,
            flagged: row.try_get("flagged")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

/// PostgreSQL-backed store; schema lives in `migrations/`.
#[derive(Clone)]
pub struct PgChatStore {
    db_pool: PgPool,
}

impl PgChatStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.db_pool).await?;
        Ok(())
    }

    async fn create_session(&self, user_id: &str, title: &str) -> Result<ChatSession, StoreError> {
        let session = sqlx::query_as::<_, ChatSession>(
            "INSERT INTO chat_sessions (user_id, title)
             VALUES ($1, $2)
             RETURNING id, user_id, title, created_at",
        )
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::debug!("Created chat session {} for user {}", session.id, user_id);
        Ok(session)
    }

    async fn get_session(&self, session_id: i64) -> Result<Option<ChatSession>, StoreError> {
        let session = sqlx::query_as::<_, ChatSession>(
            "SELECT id, user_id, title, created_at FROM chat_sessions WHERE id = $1",
        )
        .bind(session_id)
        .fetch_optional(&self.db_pool)
        .await?;
        Ok(session)
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, StoreError> {
        let sessions = sqlx::query_as::<_, SessionSummary>(&format!(
            "{} WHERE s.user_id = $1 ORDER BY s.created_at DESC, s.id DESC",
            SUMMARY_SELECT
        ))
        .bind(user_id)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(sessions)
    }

    async fn list_all_sessions(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<SessionSummary>, i64), StoreError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chat_sessions")
            .fetch_one(&self.db_pool)
            .await?;

        let sessions = sqlx::query_as::<_, SessionSummary>(&format!(
            "{} ORDER BY s.created_at DESC, s.id DESC LIMIT $1 OFFSET $2",
            SUMMARY_SELECT
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db_pool)
        .await?;

        Ok((sessions, total))
    }

    async fn delete_session(&self, session_id: i64) -> Result<bool, StoreError> {
        // chat_history and feedback cascade on delete
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.db_pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let result = sqlx::query_as::<_, ChatMessage>(&format!(
            "INSERT INTO chat_history (session_id, user_id, role, message, score, flagged)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(message.session_id)
        .bind(&message.user_id)
        .bind(message.role.as_str())
        .bind(&message.message)
        .bind(message.score)
        .bind(message.flagged)
        .fetch_one(&self.db_pool)
        .await;

        match result {
            Ok(stored) => Ok(stored),
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                Err(StoreError::NotFound("Session not found".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_message(&self, message_id: i64) -> Result<Option<ChatMessage>, StoreError> {
        let message = sqlx::query_as::<_, ChatMessage>(&format!(
            "SELECT {} FROM chat_history WHERE id = $1",
            MESSAGE_COLUMNS
        ))
        .bind(message_id)
        .fetch_optional(&self.db_pool)
        .await?;
        Ok(message)
    }

    async fn history(
        &self,
        session_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        // LIMIT NULL means no limit in PostgreSQL
        let messages = sqlx::query_as::<_, ChatMessage>(&format!(
            "SELECT {cols} FROM (
                SELECT {cols} FROM chat_history
                WHERE session_id = $1
                ORDER BY id DESC
                LIMIT $2
             ) recent
             ORDER BY id ASC",
            cols = MESSAGE_COLUMNS
        ))
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(messages)
    }

    async fn update_message_text(
        &self,
        message_id: i64,
        text: &str,
    ) -> Result<Option<ChatMessage>, StoreError> {
        let message = sqlx::query_as::<_, ChatMessage>(&format!(
            "UPDATE chat_history SET message = $2 WHERE id = $1 RETURNING {}",
            MESSAGE_COLUMNS
        ))
        .bind(message_id)
        .bind(text)
        .fetch_optional(&self.db_pool)
        .await?;
        Ok(message)
    }

    async fn add_feedback(&self, feedback: NewFeedback) -> Result<Feedback, StoreError> {
        let result = sqlx::query_as::<_, Feedback>(
            "INSERT INTO feedback (message_id, user_id, rating, comment, reward)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, message_id, user_id, rating, comment, reward, created_at",
        )
        .bind(feedback.message_id)
        .bind(&feedback.user_id)
        .bind(feedback.rating)
        .bind(&feedback.comment)
        .bind(feedback.reward)
        .fetch_one(&self.db_pool)
        .await;

        match result {
            Ok(stored) => Ok(stored),
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                Err(StoreError::NotFound("Message not found".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn metrics(&self) -> Result<Metrics, StoreError> {
        let total_sessions = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chat_sessions")
            .fetch_one(&self.db_pool)
            .await?;

        let row = sqlx::query(
            "SELECT COUNT(*) AS total_messages,
                    AVG(score) AS avg_score,
                    COUNT(*) FILTER (WHERE flagged) AS flagged_messages
             FROM chat_history",
        )
        .fetch_one(&self.db_pool)
        .await?;

        let feedback = sqlx::query(
            "SELECT COUNT(*) AS total,
                    COUNT(*) FILTER (WHERE rating > 0) AS positive,
                    COUNT(*) FILTER (WHERE rating < 0) AS negative
             FROM feedback",
        )
        .fetch_one(&self.db_pool)
        .await?;

        Ok(Metrics {
            total_sessions,
            total_messages: row.try_get("total_messages")?,
            avg_score: row.try_get("avg_score")?,
            total_feedback: feedback.try_get("total")?,
            positive_feedback: feedback.try_get("positive")?,
            negative_feedback: feedback.try_get("negative")?,
            flagged_messages: row.try_get("flagged_messages")?,
        })
    }

    async fn positive_samples(
        &self,
        min_score: f64,
        limit: i64,
    ) -> Result<Vec<TrainingSample>, StoreError> {
        let samples = sqlx::query_as::<_, TrainingSample>(
            "SELECT q.message AS question, a.message AS answer
             FROM chat_history a
             JOIN LATERAL (
                SELECT u.message FROM chat_history u
                WHERE u.session_id = a.session_id AND u.role = 'user' AND u.id < a.id
                ORDER BY u.id DESC
                LIMIT 1
             ) q ON TRUE
             WHERE a.role = 'assistant' AND a.score IS NOT NULL AND a.score > $1
             ORDER BY a.id ASC
             LIMIT $2",
        )
        .bind(min_score)
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(samples)
    }
}
