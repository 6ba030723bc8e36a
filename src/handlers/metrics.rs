use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::handlers::check_auth;
use crate::models::{UsageMetric, UsagePeriod};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UsageQuery {
    pub period: Option<String>,
}

#[derive(Serialize)]
pub struct UsageReport {
    pub company_id: String,
    pub period: &'static str,
    pub data: Vec<UsageMetric>,
}

// GET /metrics/:company_id/usage?period=daily|monthly|yearly|total
pub async fn usage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(company_id): Path<String>,
    Query(params): Query<UsageQuery>,
) -> Result<Json<UsageReport>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let period = match params.period.as_deref() {
        None => UsagePeriod::Daily,
        Some(raw) => UsagePeriod::parse(raw)
            .ok_or_else(|| AppError::BadRequest(format!("unknown period `{raw}`")))?,
    };

    let conn = state.db()?;
    let data = queries::usage_metrics(&conn, &company_id, period)?;
    Ok(Json(UsageReport {
        company_id,
        period: period.as_str(),
        data,
    }))
}
