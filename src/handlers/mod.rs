pub mod admin;
pub mod chat;
pub mod health;
pub mod metrics;
pub mod owner;

use axum::http::HeaderMap;

use crate::errors::AppError;

/// Bearer-token check shared by the operator and admin routes.
pub(crate) fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");
    if expected_token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}
