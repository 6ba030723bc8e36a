pub mod agenda;
pub mod analysis;
pub mod company;
pub mod customer;
pub mod decision;
pub mod delivery;
pub mod directive;
pub mod session;
pub mod turn;
pub mod usage;

pub use agenda::{Agenda, AgendaOption, FilteredAgenda, ProfessionalInfo, ServiceInfo};
pub use analysis::{ClassificationSource, Intent, IntentResult, Sentiment, SentimentResult};
pub use company::CompanyConfig;
pub use customer::CustomerProfile;
pub use decision::{CrmStatus, Decision, DecisionMetadata, TokenCounts};
pub use delivery::{DeadLetterRecord, DeferredJob};
pub use directive::{Appointment, Directive, ProfileUpdate, RawAppointment, RawDirective};
pub use session::{
    ChatMessage, HistoryMessage, PauseState, ResumeDecision, SenderType, Session, SessionSummary,
};
pub use turn::TurnRequest;
pub use usage::{UsageMetric, UsagePeriod, UsageRecord, UsageTokens};
