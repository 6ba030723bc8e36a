use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{DeferredJob, TurnRequest};
use crate::services::{pipeline, sessions};
use crate::state::AppState;

// POST /chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TurnRequest>,
) -> Result<Response, AppError> {
    if req.session_id.trim().is_empty() || req.company_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "session_id and company_id are required".to_string(),
        ));
    }
    if req.user_message.trim().is_empty() {
        return Err(AppError::BadRequest("user_message is empty".to_string()));
    }

    let now_utc = Utc::now().naive_utc();

    // An operator owns the conversation: store the message and answer later.
    let paused_until = {
        let conn = state.db()?;
        match queries::get_session(&conn, &req.session_id, &now_utc)? {
            Some(session) if session.pause.is_paused(now_utc) => {
                sessions::record_user_message(
                    &conn,
                    &req.session_id,
                    &req.company_id,
                    &req.user_message,
                    req.customer_profile.as_ref(),
                    now_utc,
                    state.session_ttl(),
                )?;
                session.pause.paused_until()
            }
            _ => None,
        }
    };

    if let Some(resume_at) = paused_until {
        tracing::info!(session_id = %req.session_id, %resume_at, "session paused, deferring turn");
        state
            .deferred_tx
            .send(DeferredJob::new(req, resume_at))
            .await
            .map_err(|_| AppError::QueueClosed)?;
        return Ok((
            StatusCode::ACCEPTED,
            Json(json!({ "status": "deferred", "resume_at": resume_at })),
        )
            .into_response());
    }

    let decision = pipeline::handle_turn(&state, req, now_utc, state.config.local_now()).await;
    Ok(Json(decision).into_response())
}
