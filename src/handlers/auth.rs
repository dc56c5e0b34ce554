use crate::error::AppError;
use crate::models::admin::{AdminLoginRequest, AdminLoginResponse};
use crate::models::auth::{Claims, ADMIN_ROLE};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension},
    response::Json,
    routing::{post, Router},
};
use bcrypt::verify;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;

/// Lifetime of an admin token.
pub const ADMIN_TOKEN_HOURS: i64 = 24;

pub fn auth_routes() -> Router {
    Router::new().route("/api/admin/login", post(admin_login))
}

async fn admin_login(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<AdminLoginRequest>, JsonRejection>,
) -> Result<Json<AdminLoginResponse>, AppError> {
    let Json(payload) = payload?;
    let Some(ref password_hash) = state.admin_password_hash else {
        return Err(AppError::ServiceUnavailable(
            "Admin login is not configured. Set ADMIN_PASSWORD_HASH or ADMIN_PASSWORD.".to_string(),
        ));
    };

    if payload.password.is_empty() {
        return Err(AppError::Validation("password must not be empty".to_string()));
    }

    let valid = verify(&payload.password, password_hash).map_err(|e| {
        tracing::error!("Error verifying admin password: {}", e);
        AppError::Internal("Password verification failed".to_string())
    })?;

    if !valid {
        tracing::warn!("Rejected admin login attempt");
        return Err(AppError::Unauthorized("Invalid password".to_string()));
    }

    let (token, expires_at) = create_admin_token(&state.jwt_secret)?;
    tracing::info!("Admin logged in; token valid until {}", expires_at);

    Ok(Json(AdminLoginResponse {
        success: true,
        token,
        expires_at,
    }))
}

pub fn create_admin_token(jwt_secret: &str) -> Result<(String, DateTime<Utc>), AppError> {
    let now = Utc::now();
    let expires_at = now + Duration::hours(ADMIN_TOKEN_HOURS);

    let claims = Claims {
        sub: ADMIN_ROLE.to_string(),
        role: ADMIN_ROLE.to_string(),
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_ref()),
    )
    .map_err(|e| {
        tracing::error!("Error generating JWT token: {}", e);
        AppError::Internal("Failed to generate authentication token".to_string())
    })?;

    Ok((token, expires_at))
}

pub fn verify_admin_token(token: &str, jwt_secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_ref()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}
