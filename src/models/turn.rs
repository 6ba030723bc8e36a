use serde::{Deserialize, Serialize};

use super::agenda::Agenda;
use super::company::CompanyConfig;
use super::customer::CustomerProfile;
use super::session::ChatMessage;

/// Everything one inbound customer message brings with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub company_id: String,
    pub session_id: String,
    pub user_message: String,
    #[serde(default)]
    pub company_config: CompanyConfig,
    #[serde(default)]
    pub customer_profile: Option<CustomerProfile>,
    #[serde(default)]
    pub agenda: Agenda,
    #[serde(default)]
    pub recent_history: Vec<ChatMessage>,
    /// Set when the message was stored in history before the turn ran.
    #[serde(skip)]
    pub already_recorded: bool,
}
