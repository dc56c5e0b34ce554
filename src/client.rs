//! HTTP client for the chat API, as used by the chat and admin front ends.

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::models::admin::{AdminLoginResponse, AdminSessionsResponse, TrainingTriggerResponse};
use crate::models::chat::{
    ChatMessage, ChatRequest, ChatResponse, ChatSession, FeedbackRequest, FeedbackResponse,
    Metrics, SessionSummary,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Clone)]
pub struct ChatClient {
    http: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Posts a chat message. If the session has gone stale the client opens
    /// a new session and retries once; a second failure is returned.
    pub async fn send_message(
        &self,
        user_id: &str,
        message: &str,
        session_id: Option<i64>,
    ) -> Result<ChatResponse, ClientError> {
        let request = ChatRequest {
            user_id: user_id.to_string(),
            message: message.to_string(),
            session_id,
        };

        match self.post_chat(&request).await {
            Err(ClientError::NotFound(reason)) => {
                tracing::warn!(
                    "Session {:?} not found ({}); retrying in a new session",
                    session_id,
                    reason
                );
                let session = self.create_session(user_id, None).await?;
                let retry = ChatRequest {
                    session_id: Some(session.id),
                    ..request
                };
                self.post_chat(&retry).await
            }
            other => other,
        }
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<ChatSession, ClientError> {
        let body = json!({ "user_id": user_id, "title": title });
        self.execute(self.request(Method::POST, "/api/chat/session").json(&body))
            .await
    }

    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, ClientError> {
        self.execute(
            self.request(Method::GET, "/api/chat/sessions")
                .query(&[("user_id", user_id)]),
        )
        .await
    }

    pub async fn history(&self, session_id: i64) -> Result<Vec<ChatMessage>, ClientError> {
        self.execute(
            self.request(Method::GET, "/api/chat/history")
                .query(&[("session_id", session_id)]),
        )
        .await
    }

    pub async fn edit_message(
        &self,
        message_id: i64,
        new_message: &str,
    ) -> Result<ChatResponse, ClientError> {
        self.execute(
            self.request(Method::PUT, &format!("/api/chat/edit/{}", message_id))
                .json(&json!({ "new_message": new_message })),
        )
        .await
    }

    pub async fn send_feedback(
        &self,
        feedback: &FeedbackRequest,
    ) -> Result<FeedbackResponse, ClientError> {
        self.execute(self.request(Method::POST, "/api/feedback").json(feedback))
            .await
    }

    pub async fn metrics(&self) -> Result<Metrics, ClientError> {
        self.execute(self.request(Method::GET, "/api/metrics")).await
    }

    pub async fn admin_login(&self, password: &str) -> Result<AdminLoginResponse, ClientError> {
        self.execute(
            self.request(Method::POST, "/api/admin/login")
                .json(&json!({ "password": password })),
        )
        .await
    }

    pub async fn admin_sessions(
        &self,
        token: &str,
        page: i64,
        limit: i64,
    ) -> Result<AdminSessionsResponse, ClientError> {
        self.execute(
            self.request(Method::GET, "/api/admin/sessions")
                .bearer_auth(token)
                .query(&[("page", page), ("limit", limit)]),
        )
        .await
    }

    pub async fn delete_session(&self, token: &str, session_id: i64) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .execute(
                self.request(Method::DELETE, &format!("/api/admin/sessions/{}", session_id))
                    .bearer_auth(token),
            )
            .await?;
        Ok(())
    }

    pub async fn trigger_training(&self, token: &str) -> Result<TrainingTriggerResponse, ClientError> {
        self.execute(
            self.request(Method::POST, "/api/train/reinforce")
                .bearer_auth(token),
        )
        .await
    }

    async fn post_chat<B: Serialize>(&self, request: &B) -> Result<ChatResponse, ClientError> {
        self.execute(self.request(Method::POST, "/api/chat").json(request))
            .await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{}", self.base_url, path))
    }

    async fn execute<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.detail.or(body.message))
            .unwrap_or(text);

        Err(match status {
            StatusCode::NOT_FOUND => ClientError::NotFound(message),
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => {
                ClientError::Validation(message)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized(message),
            _ => ClientError::Server {
                status: status.as_u16(),
                message,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::router;
    use crate::test_support::{test_state, TEST_ADMIN_PASSWORD};
    use axum::{http::StatusCode as AxumStatus, routing::post, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn stale_session_is_replaced_and_retried() {
        let client = ChatClient::new(&serve(router(test_state(0.5))).await);

        let response = client
            .send_message("u1", "What is a fever?", Some(4242))
            .await
            .unwrap();
        assert_ne!(response.session_id, 4242);

        let history = client.history(response.session_id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].message, "What is a fever?");
    }

    #[tokio::test]
    async fn second_not_found_surfaces() {
        let chat_calls = Arc::new(AtomicUsize::new(0));
        let counter = chat_calls.clone();
        let app = Router::new()
            .route(
                "/api/chat",
                post(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        (
                            AxumStatus::NOT_FOUND,
                            Json(serde_json::json!({ "detail": "Session not found" })),
                        )
                    }
                }),
            )
            .route(
                "/api/chat/session",
                post(|| async {
                    Json(serde_json::json!({
                        "id": 7,
                        "user_id": "u1",
                        "title": "New Chat",
                        "created_at": "2025-01-01T00:00:00Z"
                    }))
                }),
            );
        let client = ChatClient::new(&serve(app).await);

        let err = client.send_message("u1", "hello", Some(1)).await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(ref m) if m == "Session not found"));
        assert_eq!(chat_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_map_to_client_taxonomy() {
        let client = ChatClient::new(&serve(router(test_state(0.5))).await);

        let err = client.send_message("u1", "   ", None).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));

        let err = client.trigger_training("bad-token").await.unwrap_err();
        assert!(matches!(err, ClientError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn admin_flow_over_http() {
        let client = ChatClient::new(&serve(router(test_state(0.5))).await);
        let chat = client.send_message("u1", "What is a fever?", None).await.unwrap();

        let login = client.admin_login(TEST_ADMIN_PASSWORD).await.unwrap();
        assert!(login.success);

        let page = client.admin_sessions(&login.token, 1, 20).await.unwrap();
        assert_eq!(page.pagination.total, 1);

        client.delete_session(&login.token, chat.session_id).await.unwrap();
        assert!(matches!(
            client.history(chat.session_id).await.unwrap_err(),
            ClientError::NotFound(_)
        ));

        let metrics = client.metrics().await.unwrap();
        assert_eq!(metrics.total_sessions, 0);
    }
}
