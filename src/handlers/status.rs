use crate::AppState;
use axum::{extract::Extension, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn status_routes() -> Router {
    Router::new().route("/api/status", get(api_status))
}

/// Liveness plus a summary of which collaborators are wired in.
async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let store_ok = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Store health check failed: {}", e);
            false
        }
    };
    let engine = state.chat.engine();

    Json(json!({
        "status": if store_ok { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": state.store.backend(),
        "store_ok": store_ok,
        "retriever": engine.retriever_name(),
        "generator": engine.generator_name(),
        "confidence_threshold": engine.selector().threshold(),
        "admin_login": state.admin_password_hash.is_some(),
        "training_job": state.training.is_configured(),
    }))
}
