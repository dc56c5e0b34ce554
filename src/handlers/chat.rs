// src/handlers/chat.rs
use crate::error::AppError;
use crate::models::chat::{
    ChatMessage, ChatRequest, ChatResponse, ChatSession, CreateSessionRequest,
    EditMessageRequest, FeedbackRequest, FeedbackResponse, HistoryQuery, Metrics, SessionQuery,
    SessionSummary, SessionsQuery,
};
use crate::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Extension, Path, Query,
    },
    response::Json,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

pub fn chat_routes() -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/session", post(create_session).get(create_session_get))
        .route("/api/chat/sessions", get(list_sessions))
        .route("/api/chat/history", get(get_history))
        .route("/api/chat/edit/:message_id", put(edit_message))
        .route("/api/feedback", post(submit_feedback))
        .route("/api/metrics", get(get_metrics))
}

async fn chat(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) = payload?;
    let response = state.chat.chat(&request).await?;
    Ok(Json(response))
}

async fn create_session(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<Json<ChatSession>, AppError> {
    let Json(request) = payload?;
    let session = state
        .chat
        .create_session(&request.user_id, request.title.as_deref())
        .await?;
    Ok(Json(session))
}

async fn create_session_get(
    Extension(state): Extension<Arc<AppState>>,
    query: Result<Query<SessionQuery>, QueryRejection>,
) -> Result<Json<ChatSession>, AppError> {
    let Query(query) = query?;
    let session = state
        .chat
        .create_session(&query.user_id, query.title.as_deref())
        .await?;
    Ok(Json(session))
}

async fn list_sessions(
    Extension(state): Extension<Arc<AppState>>,
    query: Result<Query<SessionsQuery>, QueryRejection>,
) -> Result<Json<Vec<SessionSummary>>, AppError> {
    let Query(query) = query?;
    Ok(Json(state.chat.list_sessions(&query.user_id).await?))
}

async fn get_history(
    Extension(state): Extension<Arc<AppState>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<ChatMessage>>, AppError> {
    let Query(query) = query?;
    Ok(Json(state.chat.history(query.session_id).await?))
}

async fn edit_message(
    Extension(state): Extension<Arc<AppState>>,
    message_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<EditMessageRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Path(message_id) = message_id?;
    let Json(request) = payload?;
    let response = state
        .chat
        .edit_message(message_id, request.new_message.as_deref())
        .await?;
    Ok(Json(response))
}

async fn submit_feedback(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<FeedbackResponse>, AppError> {
    let Json(request) = payload?;
    Ok(Json(state.chat.submit_feedback(&request).await?))
}

async fn get_metrics(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Metrics>, AppError> {
    Ok(Json(state.chat.metrics().await?))
}
