// src/store/mod.rs
//! Session/message/feedback persistence. Handlers only see `ChatStore`, so
//! PostgreSQL and the in-process store are interchangeable.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::admin::TrainingSample;
use crate::models::chat::{
    ChatMessage, ChatSession, Feedback, Metrics, NewFeedback, NewMessage, SessionSummary,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryChatStore;
pub use postgres::PgChatStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Short name shown by `/api/status`.
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn create_session(&self, user_id: &str, title: &str) -> Result<ChatSession, StoreError>;

    async fn get_session(&self, session_id: i64) -> Result<Option<ChatSession>, StoreError>;

    /// Sessions owned by `user_id`, newest first.
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, StoreError>;

    /// Every session, newest first, plus the total count.
    async fn list_all_sessions(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<SessionSummary>, i64), StoreError>;

    /// Deletes the session with its messages and their feedback.
    /// Returns `false` when nothing was deleted.
    async fn delete_session(&self, session_id: i64) -> Result<bool, StoreError>;

    async fn append_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError>;

    async fn get_message(&self, message_id: i64) -> Result<Option<ChatMessage>, StoreError>;

    /// The latest `limit` messages of a session (all when `None`), oldest first.
    async fn history(
        &self,
        session_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<ChatMessage>, StoreError>;

    async fn update_message_text(
        &self,
        message_id: i64,
        text: &str,
    ) -> Result<Option<ChatMessage>, StoreError>;

    async fn add_feedback(&self, feedback: NewFeedback) -> Result<Feedback, StoreError>;

    async fn metrics(&self) -> Result<Metrics, StoreError>;

    /// Assistant answers scored above `min_score`, each paired with the user
    /// message that preceded it in the same session.
    async fn positive_samples(
        &self,
        min_score: f64,
        limit: i64,
    ) -> Result<Vec<TrainingSample>, StoreError>;
}
