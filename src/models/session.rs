use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::customer::CustomerProfile;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
    pub timestamp: NaiveDateTime,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl HistoryMessage {
    pub fn to_chat(&self) -> ChatMessage {
        ChatMessage {
            role: self.role.clone(),
            content: self.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub total_interactions: u32,
    #[serde(default)]
    pub sentiment_history: Vec<String>,
    #[serde(default)]
    pub intent_history: Vec<String>,
    #[serde(default)]
    pub last_status: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    User,
    Owner,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::User => "user",
            SenderType::Owner => "owner",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "owner" => SenderType::Owner,
            _ => SenderType::User,
        }
    }
}

/// Whether automated replies are suppressed because an operator took over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PauseState {
    Active,
    PausedByOwner { until: NaiveDateTime },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    Resume,
    StillPaused { until: NaiveDateTime },
    OwnerTookOver,
}

impl PauseState {
    pub fn from_column(paused_until: Option<NaiveDateTime>) -> Self {
        match paused_until {
            Some(until) => PauseState::PausedByOwner { until },
            None => PauseState::Active,
        }
    }

    pub fn paused_until(&self) -> Option<NaiveDateTime> {
        match self {
            PauseState::Active => None,
            PauseState::PausedByOwner { until } => Some(*until),
        }
    }

    pub fn is_paused(&self, now: NaiveDateTime) -> bool {
        matches!(self, PauseState::PausedByOwner { until } if *until > now)
    }

    /// An operator message (re)starts the window from `now`.
    pub fn on_owner_message(now: NaiveDateTime, window: Duration) -> Self {
        PauseState::PausedByOwner { until: now + window }
    }
}

/// Resume check for a deferred turn. A window extended past `now` or an
/// operator message after the customer's means the job must not reply.
pub fn resume_decision(
    pause: PauseState,
    last_sender: SenderType,
    now: NaiveDateTime,
) -> ResumeDecision {
    if let PauseState::PausedByOwner { until } = pause {
        if until > now {
            return ResumeDecision::StillPaused { until };
        }
    }
    if last_sender != SenderType::User {
        return ResumeDecision::OwnerTookOver;
    }
    ResumeDecision::Resume
}

pub fn can_resume(pause: PauseState, last_sender: SenderType, now: NaiveDateTime) -> bool {
    resume_decision(pause, last_sender, now) == ResumeDecision::Resume
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub company_id: String,
    pub customer: Option<CustomerProfile>,
    pub messages: Vec<HistoryMessage>,
    pub summary: SessionSummary,
    pub pause: PauseState,
    pub last_sender: SenderType,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl Session {
    pub fn new(session_id: &str, company_id: &str, now: NaiveDateTime, ttl: Duration) -> Self {
        Self {
            session_id: session_id.to_string(),
            company_id: company_id.to_string(),
            customer: None,
            messages: vec![],
            summary: SessionSummary::default(),
            pause: PauseState::Active,
            last_sender: SenderType::User,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn recent_history(&self, n: usize) -> Vec<ChatMessage> {
        let start = self.messages.len().saturating_sub(n);
        self.messages[start..].iter().map(HistoryMessage::to_chat).collect()
    }
}
