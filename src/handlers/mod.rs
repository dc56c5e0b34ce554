// src/handlers/mod.rs
pub mod admin;
pub mod auth;
pub mod chat;
pub mod status;

use crate::middleware::logging::request_logging_middleware;
use crate::AppState;
use axum::{Extension, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// The complete API with logging, CORS and shared state applied.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(status::status_routes())
        .merge(auth::auth_routes())
        .merge(chat::chat_routes())
        .merge(admin::admin_routes())
        .layer(axum::middleware::from_fn(request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}
