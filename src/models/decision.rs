use serde::{Deserialize, Serialize};

use super::analysis::{Intent, Sentiment};
use super::directive::Directive;

/// CRM pipeline column the conversation belongs in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CrmStatus {
    NewLead,
    InService,
    Scheduled,
    Rescheduling,
    Cancelled,
    HumanHandoff,
    Inquiry,
}

impl CrmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrmStatus::NewLead => "NewLead",
            CrmStatus::InService => "InService",
            CrmStatus::Scheduled => "Scheduled",
            CrmStatus::Rescheduling => "Rescheduling",
            CrmStatus::Cancelled => "Cancelled",
            CrmStatus::HumanHandoff => "HumanHandoff",
            CrmStatus::Inquiry => "Inquiry",
        }
    }

    /// Accepts the board labels in either language plus the enum names.
    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '/')
            .collect();
        match key.as_str() {
            "newlead" | "novolead" => Some(CrmStatus::NewLead),
            "inservice" | "ematendimento" => Some(CrmStatus::InService),
            "scheduled" | "agendado" => Some(CrmStatus::Scheduled),
            "rescheduling" | "reagendamento" => Some(CrmStatus::Rescheduling),
            "cancelled" | "canceled" | "cancelado" => Some(CrmStatus::Cancelled),
            "humanhandoff" | "handoffhumano" => Some(CrmStatus::HumanHandoff),
            "inquiry" | "dúvida/info" | "dúvidainfo" | "duvida/info" => Some(CrmStatus::Inquiry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenCounts {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

impl TokenCounts {
    pub fn add(self, prompt: u32, completion: u32) -> Self {
        let prompt = self.prompt + prompt;
        let completion = self.completion + completion;
        Self {
            prompt,
            completion,
            total: prompt + completion,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionMetadata {
    pub intent: Intent,
    pub sentiment: Sentiment,
    pub token_counts: TokenCounts,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// The only externally visible output of a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub session_id: String,
    pub company_id: String,
    pub reply_text: String,
    pub status: CrmStatus,
    pub directive: Directive,
    pub metadata: DecisionMetadata,
}

pub const FALLBACK_REPLY: &str =
    "Sorry, I'm having trouble right now. Please try again in a moment.";

impl Decision {
    /// Reply used when a turn fails fatally; never carries an action.
    pub fn fallback(session_id: &str, company_id: &str, warnings: Vec<String>) -> Self {
        Self {
            session_id: session_id.to_string(),
            company_id: company_id.to_string(),
            reply_text: FALLBACK_REPLY.to_string(),
            status: CrmStatus::InService,
            directive: Directive::Normal,
            metadata: DecisionMetadata {
                intent: Intent::Info,
                sentiment: Sentiment::Neutral,
                token_counts: TokenCounts::default(),
                warnings,
            },
        }
    }
}
