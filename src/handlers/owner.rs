use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::services::sessions;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct OwnerMessage {
    pub company_id: String,
    pub message: String,
}

// POST /sessions/:session_id/owner
pub async fn owner_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<OwnerMessage>,
) -> Result<Json<Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    if body.message.trim().is_empty() {
        return Err(AppError::BadRequest("message is empty".to_string()));
    }

    let now = Utc::now().naive_utc();
    let session = {
        let conn = state.db()?;
        sessions::record_owner_message(
            &conn,
            &session_id,
            &body.company_id,
            &body.message,
            now,
            state.owner_pause(),
            state.session_ttl(),
        )?
    };

    let paused_until = session.pause.paused_until();
    tracing::info!(session_id = %session_id, paused_until = ?paused_until, "operator took over");
    Ok(Json(json!({ "status": "paused", "paused_until": paused_until })))
}
