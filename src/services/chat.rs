// src/services/chat.rs
use std::sync::Arc;

use crate::engine::ChatEngine;
use crate::error::AppError;
use crate::models::chat::{
    ChatMessage, ChatRequest, ChatResponse, ChatSession, FeedbackRequest, FeedbackResponse,
    Metrics, NewFeedback, NewMessage, Role, SessionSummary, DEFAULT_SESSION_TITLE,
};
use crate::rewards::feedback_reward;
use crate::selector::display_score;
use crate::store::ChatStore;

/// Length of a session title derived from its first message.
const TITLE_CHARS: usize = 40;

/// Session, message and feedback operations behind the chat endpoints.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn ChatStore>,
    engine: ChatEngine,
    history_limit: i64,
}

impl ChatService {
    pub fn new(store: Arc<dyn ChatStore>, engine: ChatEngine, history_limit: i64) -> Self {
        Self {
            store,
            engine,
            history_limit: history_limit.max(1),
        }
    }

    pub fn engine(&self) -> &ChatEngine {
        &self.engine
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<ChatSession, AppError> {
        let user_id = required(user_id, "user_id")?;
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_SESSION_TITLE);

        let session = self.store.create_session(user_id, title).await?;
        tracing::info!("Created session {} for user {}", session.id, user_id);
        Ok(session)
    }

    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, AppError> {
        let user_id = required(user_id, "user_id")?;
        Ok(self.store.list_sessions(user_id).await?)
    }

    pub async fn history(&self, session_id: i64) -> Result<Vec<ChatMessage>, AppError> {
        if self.store.get_session(session_id).await?.is_none() {
            return Err(AppError::NotFound("Session not found".to_string()));
        }
        Ok(self.store.history(session_id, None).await?)
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        let user_id = required(&request.user_id, "user_id")?;
        let question = required(&request.message, "message")?;

        let session = self.resolve_session(user_id, request.session_id, question).await?;
        let history = self.store.history(session.id, Some(self.history_limit)).await?;

        let user_message = self
            .store
            .append_message(NewMessage::user(session.id, user_id, question))
            .await?;

        self.respond(&session, user_message, question, &history).await
    }

    /// Replaces the text of a user message and appends a fresh answer to
    /// the end of its session.
    pub async fn edit_message(
        &self,
        message_id: i64,
        new_message: Option<&str>,
    ) -> Result<ChatResponse, AppError> {
        let text = new_message
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Validation("new_message must not be empty".to_string()))?;

        let original = self
            .store
            .get_message(message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;
        if original.role != Role::User {
            return Err(AppError::Validation(
                "Only user messages can be edited".to_string(),
            ));
        }

        let session = self
            .store
            .get_session(original.session_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

        let edited = self
            .store
            .update_message_text(message_id, text)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

        // Only the conversation before the edited question feeds the answer.
        let mut history: Vec<ChatMessage> = self
            .store
            .history(session.id, None)
            .await?
            .into_iter()
            .filter(|m| m.id < message_id)
            .collect();
        let excess = history.len().saturating_sub(self.history_limit as usize);
        history.drain(..excess);

        tracing::info!("Edited message {} in session {}", message_id, session.id);
        self.respond(&session, edited, text, &history).await
    }

    pub async fn submit_feedback(
        &self,
        request: &FeedbackRequest,
    ) -> Result<FeedbackResponse, AppError> {
        let user_id = required(&request.user_id, "user_id")?;
        if request.rating != 1 && request.rating != -1 {
            return Err(AppError::Validation("rating must be 1 or -1".to_string()));
        }

        let message = self
            .store
            .get_message(request.message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".to_string()))?;

        let reward = feedback_reward(request.rating, message.score);
        let feedback = self
            .store
            .add_feedback(NewFeedback {
                message_id: message.id,
                user_id: user_id.to_string(),
                rating: request.rating,
                comment: request
                    .comment
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
                reward,
            })
            .await?;

        tracing::info!(
            "Feedback {} on message {}: rating {} reward {:.3}",
            feedback.id,
            message.id,
            feedback.rating,
            feedback.reward
        );

        Ok(FeedbackResponse {
            success: true,
            feedback_id: feedback.id,
            new_reward: feedback.reward,
        })
    }

    pub async fn metrics(&self) -> Result<Metrics, AppError> {
        Ok(self.store.metrics().await?)
    }

    async fn resolve_session(
        &self,
        user_id: &str,
        session_id: Option<i64>,
        first_message: &str,
    ) -> Result<ChatSession, AppError> {
        if let Some(id) = session_id {
            return match self.store.get_session(id).await? {
                Some(session) if session.user_id == user_id => Ok(session),
                _ => Err(AppError::NotFound("Session not found".to_string())),
            };
        }

        if let Some(latest) = self.store.list_sessions(user_id).await?.into_iter().next() {
            if let Some(session) = self.store.get_session(latest.id).await? {
                return Ok(session);
            }
        }

        let title: String = first_message.chars().take(TITLE_CHARS).collect();
        Ok(self.store.create_session(user_id, &title).await?)
    }

    async fn respond(
        &self,
        session: &ChatSession,
        user_message: ChatMessage,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<ChatResponse, AppError> {
        let answer = self.engine.answer(question, history).await;

        let assistant_message = self
            .store
            .append_message(NewMessage::assistant(
                session.id,
                &session.user_id,
                &answer.text,
                answer.confidence,
                answer.flagged,
            ))
            .await?;

        tracing::debug!(
            "Answered in session {} via {:?} (score {:?})",
            session.id,
            answer.source,
            answer.confidence
        );

        Ok(ChatResponse {
            answer: answer.text,
            score: answer.confidence,
            display_score: display_score(answer.confidence),
            source: answer.source,
            flagged: answer.flagged,
            session_id: session.id,
            user_message_id: user_message.id,
            assistant_message_id: assistant_message.id,
        })
    }
}

fn required<'a>(value: &'a str, field: &str) -> Result<&'a str, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} must not be empty", field)));
    }
    Ok(trimmed)
}
