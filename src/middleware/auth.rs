use crate::error::AppError;
use crate::handlers::auth::verify_admin_token;
use crate::AppState;
use axum::{
    extract::{Extension, Request},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Requires `Authorization: Bearer <jwt>` carrying the admin role. The
/// verified claims are inserted into the request extensions.
pub async fn admin_auth_middleware(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_str = headers
        .get("Authorization")
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header format".to_string()))?;

    let token = auth_str.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::Unauthorized(
            "Invalid Authorization header format. Expected 'Bearer <token>'".to_string(),
        )
    })?;

    let claims = verify_admin_token(token, &state.jwt_secret).map_err(|e| {
        tracing::warn!("JWT verification failed: {}", e);
        AppError::Unauthorized("Invalid or expired token".to_string())
    })?;

    if !claims.is_admin() {
        return Err(AppError::Unauthorized("Admin access required".to_string()));
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}
