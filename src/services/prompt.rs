use chrono::NaiveDateTime;

use crate::models::{CompanyConfig, CustomerProfile, Intent, Sentiment};

pub struct PromptContext<'a> {
    pub company: &'a CompanyConfig,
    pub customer: Option<&'a CustomerProfile>,
    pub is_data_complete: bool,
    pub require_email: bool,
    pub intent: Intent,
    pub sentiment: Sentiment,
    pub agenda_text: &'a str,
    pub now: NaiveDateTime,
}

fn data_protocol(is_complete: bool, require_email: bool) -> String {
    if is_complete {
        return "REGISTRATION: complete. You may schedule.".to_string();
    }
    let wanted = if require_email { "name AND email" } else { "full name" };
    format!(
        "REGISTRATION: INCOMPLETE. DATA COLLECTION BARRIER IS ACTIVE.\n\
         - Do not confirm any appointment yet.\n\
         - Ask for the customer's {wanted} in a single message.\n\
         - When the customer provides it, emit an update_user directive with the values."
    )
}

pub fn build_system_prompt(ctx: &PromptContext<'_>) -> String {
    let customer = ctx
        .customer
        .map(CustomerProfile::to_prompt_text)
        .unwrap_or_else(|| "No customer profile provided.".to_string());

    format!(
        r#"IDENTITY
You are a scheduling assistant for a {niche} business.
Current date/time: {now}

SINGLE MISSION
Turn this conversation into a confirmed appointment. You are not a general assistant.

{persona}

CUSTOMER CONTEXT
{customer}

PRIOR ANALYSIS
Detected intent: {intent}
Sentiment: {sentiment}

{protocol}

AVAILABLE AGENDA (ONLY SOURCE OF TRUTH)
{agenda}

SCHEDULING RULES
1. Offer two concrete options with professional, date and time. Never ask open questions like "which day do you prefer?".
2. Use ONLY the slots listed in the agenda above. Never invent dates, times or professionals.
3. Emit appointment_confirmation only after the customer explicitly confirms professional, service, date and time.
4. On a first cancellation request offer to reschedule; cancel on the second.
5. IDs must be copied exactly from the agenda. Dates are YYYY-MM-DD, times HH:MM.

RESPONSE FORMAT (JSON ONLY)
{{
  "response_text": "your message to the customer",
  "kanban_status": "NewLead|InService|Scheduled|Rescheduling|Cancelled|HumanHandoff|Inquiry",
  "directives": {{
    "type": "normal|update_user|appointment_confirmation",
    "payload_update": {{"name": "string or null", "email": "string or null", "phone": "string or null"}},
    "payload_appointment": {{"professional_id": "exact id", "service_id": "exact id", "date": "YYYY-MM-DD", "time": "HH:MM"}}
  }}
}}"#,
        niche = ctx.company.niche,
        now = ctx.now.format("%Y-%m-%d %H:%M (%A)"),
        persona = ctx.company.to_prompt(),
        intent = ctx.intent.as_str(),
        sentiment = ctx.sentiment.as_str(),
        protocol = data_protocol(ctx.is_data_complete, ctx.require_email),
        agenda = ctx.agenda_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(company: &'a CompanyConfig, complete: bool) -> PromptContext<'a> {
        PromptContext {
            company,
            customer: None,
            is_data_complete: complete,
            require_email: true,
            intent: Intent::Scheduling,
            sentiment: Sentiment::Anxious,
            agenda_text: "- Ana (ID: A1) on 2025-12-10: 09:00",
            now: NaiveDateTime::parse_from_str("2025-12-10 08:30", "%Y-%m-%d %H:%M").unwrap(),
        }
    }

    #[test]
    fn test_prompt_carries_analysis_and_agenda() {
        let company = CompanyConfig::default();
        let prompt = build_system_prompt(&context(&company, true));
        assert!(prompt.contains("2025-12-10 08:30 (Wednesday)"));
        assert!(prompt.contains("Detected intent: SCHEDULING"));
        assert!(prompt.contains("Sentiment: ANXIOUS"));
        assert!(prompt.contains("Ana (ID: A1)"));
        assert!(prompt.contains("REGISTRATION: complete"));
        assert!(prompt.contains("No customer profile provided."));
    }

    #[test]
    fn test_barrier_when_incomplete() {
        let company = CompanyConfig::default();
        let prompt = build_system_prompt(&context(&company, false));
        assert!(prompt.contains("DATA COLLECTION BARRIER IS ACTIVE"));
        assert!(prompt.contains("name AND email"));
    }
}
