// src/store/memory.rs
use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{ChatStore, StoreError};
use crate::models::admin::TrainingSample;
use crate::models::chat::{
    ChatMessage, ChatSession, Feedback, Metrics, NewFeedback, NewMessage, Role, SessionSummary,
};

#[derive(Default)]
struct Inner {
    next_session_id: i64,
    next_message_id: i64,
    next_feedback_id: i64,
    sessions: BTreeMap<i64, ChatSession>,
    messages: BTreeMap<i64, ChatMessage>,
    feedback: Vec<Feedback>,
}

impl Inner {
    fn summarize(&self, session: &ChatSession) -> SessionSummary {
        let message_ids: Vec<i64> = self
            .messages
            .values()
            .filter(|m| m.session_id == session.id)
            .map(|m| m.id)
            .collect();

        let rewards: Vec<f64> = self
            .feedback
            .iter()
            .filter(|f| message_ids.contains(&f.message_id))
            .map(|f| f.reward)
            .collect();

        SessionSummary {
            id: session.id,
            user_id: session.user_id.clone(),
            title: session.title.clone(),
            created_at: session.created_at,
            message_count: message_ids.len() as i64,
            avg_reward: mean(&rewards),
        }
    }

    fn newest_first<'a>(&self, sessions: impl Iterator<Item = &'a ChatSession>) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = sessions.map(|s| self.summarize(s)).collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        summaries
    }
}

/// In-process store used when no `DATABASE_URL` is configured, and by tests.
/// Ids are handed out from counters, so they are unique and increasing.
#[derive(Default)]
pub struct MemoryChatStore {
    inner: RwLock<Inner>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn create_session(&self, user_id: &str, title: &str) -> Result<ChatSession, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_session_id += 1;
        let session = ChatSession {
            id: inner.next_session_id,
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        inner.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: i64) -> Result<Option<ChatSession>, StoreError> {
        Ok(self.inner.read().await.sessions.get(&session_id).cloned())
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.newest_first(inner.sessions.values().filter(|s| s.user_id == user_id)))
    }

    async fn list_all_sessions(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<SessionSummary>, i64), StoreError> {
        let inner = self.inner.read().await;
        let all = inner.newest_first(inner.sessions.values());
        let total = all.len() as i64;
        let page = all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn delete_session(&self, session_id: i64) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.sessions.remove(&session_id).is_none() {
            return Ok(false);
        }
        let removed: Vec<i64> = inner
            .messages
            .values()
            .filter(|m| m.session_id == session_id)
            .map(|m| m.id)
            .collect();
        for id in &removed {
            inner.messages.remove(id);
        }
        inner.feedback.retain(|f| !removed.contains(&f.message_id));
        Ok(true)
    }

    async fn append_message(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.sessions.contains_key(&message.session_id) {
            return Err(StoreError::NotFound("Session not found".to_string()));
        }
        inner.next_message_id += 1;
        let stored = ChatMessage {
            id: inner.next_message_id,
            session_id: message.session_id,
            user_id: message.user_id,
            role: message.role,
            message: message.message,
            score: message.score,
            flagged: message.flagged,
            timestamp: Utc::now(),
        };
        inner.messages.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_message(&self, message_id: i64) -> Result<Option<ChatMessage>, StoreError> {
        Ok(self.inner.read().await.messages.get(&message_id).cloned())
    }

    async fn history(
        &self,
        session_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let inner = self.inner.read().await;
        let all: Vec<ChatMessage> = inner
            .messages
            .values()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        let skip = match limit {
            Some(limit) => all.len().saturating_sub(limit.max(0) as usize),
            None => 0,
        };
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn update_message_text(
        &self,
        message_id: i64,
        text: &str,
    ) -> Result<Option<ChatMessage>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.messages.get_mut(&message_id).map(|m| {
            m.message = text.to_string();
            m.clone()
        }))
    }

    async fn add_feedback(&self, feedback: NewFeedback) -> Result<Feedback, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.messages.contains_key(&feedback.message_id) {
            return Err(StoreError::NotFound("Message not found".to_string()));
        }
        inner.next_feedback_id += 1;
        let stored = Feedback {
            id: inner.next_feedback_id,
            message_id: feedback.message_id,
            user_id: feedback.user_id,
            rating: feedback.rating,
            comment: feedback.comment,
            reward: feedback.reward,
            created_at: Utc::now(),
        };
        inner.feedback.push(stored.clone());
        Ok(stored)
    }

    async fn metrics(&self) -> Result<Metrics, StoreError> {
        let inner = self.inner.read().await;
        let scores: Vec<f64> = inner.messages.values().filter_map(|m| m.score).collect();
        Ok(Metrics {
            total_sessions: inner.sessions.len() as i64,
            total_messages: inner.messages.len() as i64,
            avg_score: mean(&scores),
            total_feedback: inner.feedback.len() as i64,
            positive_feedback: inner.feedback.iter().filter(|f| f.rating > 0).count() as i64,
            negative_feedback: inner.feedback.iter().filter(|f| f.rating < 0).count() as i64,
            flagged_messages: inner.messages.values().filter(|m| m.flagged).count() as i64,
        })
    }

    async fn positive_samples(
        &self,
        min_score: f64,
        limit: i64,
    ) -> Result<Vec<TrainingSample>, StoreError> {
        let inner = self.inner.read().await;
        let mut samples = Vec::new();
        for answer in inner.messages.values() {
            if samples.len() as i64 >= limit {
                break;
            }
            let scored = answer.score.map_or(false, |s| s > min_score);
            if answer.role != Role::Assistant || !scored {
                continue;
            }
            let question = inner
                .messages
                .range(..answer.id)
                .rev()
                .map(|(_, m)| m)
                .find(|m| m.session_id == answer.session_id && m.role == Role::User);
            if let Some(question) = question {
                samples.push(TrainingSample {
                    question: question.message.clone(),
                    answer: answer.message.clone(),
                });
            }
        }
        Ok(samples)
    }
}
