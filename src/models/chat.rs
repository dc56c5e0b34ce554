// src/models/chat.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::selector::AnswerSource;

pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "user" | "human" => Some(Role::User),
            "assistant" | "model" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ChatSession {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Session with its derived counters, as listed to users and admins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SessionSummary {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub message_count: i64,
    pub avg_reward: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: i64,
    pub user_id: String,
    pub role: Role,
    pub message: String,
    pub score: Option<f64>,
    pub flagged: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: i64,
    pub user_id: String,
    pub role: Role,
    pub message: String,
    pub score: Option<f64>,
    pub flagged: bool,
}

impl NewMessage {
    pub fn user(session_id: i64, user_id: &str, message: &str) -> Self {
        Self {
            session_id,
            user_id: user_id.to_string(),
            role: Role::User,
            message: message.to_string(),
            score: None,
            flagged: false,
        }
    }

    pub fn assistant(
        session_id: i64,
        user_id: &str,
        message: &str,
        score: Option<f64>,
        flagged: bool,
    ) -> Self {
        Self {
            session_id,
            user_id: user_id.to_string(),
            role: Role::Assistant,
            message: message.to_string(),
            score,
            flagged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Feedback {
    pub id: i64,
    pub message_id: i64,
    pub user_id: String,
    pub rating: i32,
    pub comment: Option<String>,
    pub reward: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub message_id: i64,
    pub user_id: String,
    pub rating: i32,
    pub comment: Option<String>,
    pub reward: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_sessions: i64,
    pub total_messages: i64,
    pub avg_score: Option<f64>,
    pub total_feedback: i64,
    pub positive_feedback: i64,
    pub negative_feedback: i64,
    pub flagged_messages: i64,
}

// Requests

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub user_id: String,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub user_id: String,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub session_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub session_id: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EditMessageRequest {
    #[serde(default)]
    pub new_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub user_id: String,
    pub message_id: i64,
    pub rating: i32,
    #[serde(default)]
    pub comment: Option<String>,
}

// Responses

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub score: Option<f64>,
    pub display_score: Option<f64>,
    pub source: AnswerSource,
    pub flagged: bool,
    pub session_id: i64,
    pub user_message_id: i64,
    pub assistant_message_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub success: bool,
    pub feedback_id: i64,
    pub new_reward: f64,
}
