use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::turn::TurnRequest;

/// A customer turn that arrived inside a pause window, to be answered once
/// the window ends.
#[derive(Debug, Clone)]
pub struct DeferredJob {
    pub id: Uuid,
    pub request: TurnRequest,
    pub due_at: NaiveDateTime,
}

impl DeferredJob {
    pub fn new(mut request: TurnRequest, due_at: NaiveDateTime) -> Self {
        request.already_recorded = true;
        Self {
            id: Uuid::new_v4(),
            request,
            due_at,
        }
    }
}

/// Terminal record of a delivery that exhausted its retry budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadLetterRecord {
    pub id: String,
    pub session_id: String,
    pub company_id: String,
    pub endpoint: String,
    pub payload: serde_json::Value,
    pub error: String,
    pub attempts: u32,
    pub failed_at: NaiveDateTime,
    pub reprocessed: bool,
}
