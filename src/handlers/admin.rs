use crate::error::AppError;
use crate::middleware::auth::admin_auth_middleware;
use crate::models::admin::{
    AdminSessionsResponse, Pagination, SessionsPageQuery, TrainingTriggerResponse,
};
use crate::AppState;
use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Extension, Path, Query,
    },
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

pub const TRAINING_STARTED_MESSAGE: &str = "Reinforcement training started in background.";

pub fn admin_routes() -> Router {
    Router::new()
        .route("/api/admin/sessions", get(admin_sessions_api))
        .route("/api/admin/sessions/:id", delete(admin_delete_session))
        .route("/api/train/reinforce", post(trigger_reinforcement))
        .route_layer(axum::middleware::from_fn(admin_auth_middleware))
}

async fn admin_sessions_api(
    Extension(state): Extension<Arc<AppState>>,
    query: Result<Query<SessionsPageQuery>, QueryRejection>,
) -> Result<Json<AdminSessionsResponse>, AppError> {
    let Query(params) = query?;
    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = page.saturating_sub(1).saturating_mul(limit);

    let (sessions, total) = state.store.list_all_sessions(limit, offset).await?;

    Ok(Json(AdminSessionsResponse {
        success: true,
        sessions,
        pagination: Pagination {
            page,
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        },
    }))
}

async fn admin_delete_session(
    Extension(state): Extension<Arc<AppState>>,
    session_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Value>, AppError> {
    let Path(session_id) = session_id?;

    if !state.store.delete_session(session_id).await? {
        return Err(AppError::NotFound("Session not found".to_string()));
    }

    tracing::info!("Admin deleted session {}", session_id);
    Ok(Json(json!({
        "success": true,
        "message": format!("Session {} deleted", session_id)
    })))
}

async fn trigger_reinforcement(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<TrainingTriggerResponse> {
    state.training.trigger();
    Json(TrainingTriggerResponse {
        message: TRAINING_STARTED_MESSAGE.to_string(),
    })
}
