use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::models::DeadLetterRecord;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Deserialize)]
pub struct DeadLetterQuery {
    pub session_id: Option<String>,
    pub limit: Option<i64>,
}

// GET /api/admin/dead-letters
pub async fn list_dead_letters(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<DeadLetterQuery>,
) -> Result<Json<Vec<DeadLetterRecord>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let conn = state.db()?;
    let records = queries::list_dead_letters(&conn, params.session_id.as_deref(), limit)?;
    Ok(Json(records))
}

// POST /api/admin/dead-letters/:id/reprocessed
pub async fn mark_reprocessed(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let conn = state.db()?;
    if !queries::mark_dead_letter_reprocessed(&conn, &id)? {
        return Err(AppError::NotFound(format!("dead letter {id}")));
    }
    tracing::info!(dead_letter_id = %id, "dead letter marked reprocessed");
    Ok(Json(json!({ "status": "ok", "id": id })))
}
