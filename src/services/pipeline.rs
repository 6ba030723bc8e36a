//! Fixed stage sequence for one customer turn. Each stage consumes the
//! context and returns a new one; only generation can abort the turn.

use chrono::NaiveDateTime;

use crate::models::{
    ChatMessage, CrmStatus, CustomerProfile, Decision, DecisionMetadata, FilteredAgenda,
    IntentResult, SentimentResult, TokenCounts, TurnRequest, UsageRecord,
};
use crate::services::ai::generation::{generate_reply, GeneratedReply, GenerationError};
use crate::services::ai::rules::Classified;
use crate::services::entities::ExtractedEntities;
use crate::services::prompt::{build_system_prompt, PromptContext};
use crate::services::reconciler::reconcile;
use crate::services::sessions::{self, TurnRecord};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("validation gate failed: {0}")]
    ValidationGate(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Everything the stages have learned about the turn so far.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub request: TurnRequest,
    /// Business-local wall clock.
    pub now: NaiveDateTime,
    pub history: Vec<ChatMessage>,
    pub customer: Option<CustomerProfile>,
    pub is_data_complete: bool,
    pub sentiment: Option<SentimentResult>,
    pub intent: Option<IntentResult>,
    pub entities: ExtractedEntities,
    pub filtered: Option<FilteredAgenda>,
    pub usage: TokenCounts,
    pub warnings: Vec<String>,
}

impl TurnContext {
    pub fn new(request: TurnRequest, now: NaiveDateTime) -> Self {
        Self {
            customer: request.customer_profile.clone(),
            history: request.recent_history.clone(),
            request,
            now,
            is_data_complete: false,
            sentiment: None,
            intent: None,
            entities: ExtractedEntities::default(),
            filtered: None,
            usage: TokenCounts::default(),
            warnings: Vec::new(),
        }
    }

    pub fn with_history(self, history: Vec<ChatMessage>) -> Self {
        Self { history, ..self }
    }

    pub fn with_customer(self, customer: Option<CustomerProfile>, is_data_complete: bool) -> Self {
        Self {
            customer,
            is_data_complete,
            ..self
        }
    }

    pub fn with_sentiment(self, classified: Classified<SentimentResult>) -> Self {
        let ctx = self.with_usage(classified.usage).with_warning(classified.warning);
        Self {
            sentiment: Some(classified.result),
            ..ctx
        }
    }

    pub fn with_intent(self, classified: Classified<IntentResult>) -> Self {
        let ctx = self.with_usage(classified.usage).with_warning(classified.warning);
        Self {
            intent: Some(classified.result),
            ..ctx
        }
    }

    pub fn with_entities(self, entities: ExtractedEntities) -> Self {
        Self { entities, ..self }
    }

    pub fn with_filtered(self, filtered: Option<FilteredAgenda>) -> Self {
        Self { filtered, ..self }
    }

    pub fn with_warning(mut self, warning: Option<String>) -> Self {
        if let Some(w) = warning {
            self.warnings.push(w);
        }
        self
    }

    fn with_usage(self, usage: TokenCounts) -> Self {
        Self {
            usage: self.usage.add(usage.prompt, usage.completion),
            ..self
        }
    }

    fn agenda_text(&self) -> String {
        match &self.filtered {
            Some(view) => view.to_prompt_text(),
            None => self.request.agenda.to_prompt_text(),
        }
    }
}

fn load_context(
    state: &AppState,
    request: TurnRequest,
    now_utc: NaiveDateTime,
    now: NaiveDateTime,
) -> TurnContext {
    let ctx = TurnContext::new(request, now);
    let problems = ctx.request.agenda.dangling_references();
    let ctx = problems
        .into_iter()
        .fold(ctx, |ctx, p| ctx.with_warning(Some(format!("agenda: {p}"))));

    let stored = state
        .db()
        .and_then(|conn| crate::db::queries::get_session(&conn, &ctx.request.session_id, &now_utc));
    let session = match stored {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(stage = "load_context", error = %e, "session load failed");
            return ctx.with_warning(Some(format!("session load failed: {e}")));
        }
    };

    let Some(session) = session else {
        return ctx;
    };

    let mut history = if ctx.history.is_empty() {
        session.recent_history(state.config.history_window + 1)
    } else {
        ctx.history.clone()
    };
    // A deferred message is already the last stored turn.
    if ctx.request.already_recorded {
        if let Some(last) = history.last() {
            if last.role == "user" && last.content == ctx.request.user_message {
                history.pop();
            }
        }
    }
    let start = history.len().saturating_sub(state.config.history_window);
    let history = history.split_off(start);

    // A deferred request carries the profile from enqueue time; the stored
    // one may have been corrected since.
    let customer = if ctx.request.already_recorded {
        session.customer.or_else(|| ctx.customer.clone())
    } else {
        ctx.customer.clone().or(session.customer)
    };
    let complete = ctx.is_data_complete;
    ctx.with_history(history).with_customer(customer, complete)
}

fn check_integrity(state: &AppState, ctx: TurnContext) -> TurnContext {
    let (customer, report) = state.integrity.apply(ctx.customer.as_ref());
    if !report.is_data_complete {
        tracing::info!(
            stage = "integrity",
            missing = ?report.missing,
            "customer data incomplete, collection barrier active"
        );
    }
    ctx.with_customer(customer, report.is_data_complete)
        .with_warning(report.error.map(|e| format!("integrity: {e}")))
}

async fn classify(state: &AppState, ctx: TurnContext) -> TurnContext {
    let llm = state.llm.as_ref();
    let sentiment = state
        .sentiment
        .classify(llm, &ctx.request.user_message, &ctx.history)
        .await;
    let intent = state
        .intent
        .classify(llm, &ctx.request.user_message, &ctx.history)
        .await;
    tracing::info!(
        stage = "classify",
        sentiment = sentiment.result.sentiment.as_str(),
        intent = intent.result.intent.as_str(),
        "message classified"
    );
    ctx.with_sentiment(sentiment).with_intent(intent)
}

fn extract_entities(state: &AppState, ctx: TurnContext) -> TurnContext {
    match state
        .extractor
        .extract(&ctx.request.user_message, &ctx.request.agenda, ctx.now.date())
    {
        Ok(entities) => {
            tracing::debug!(stage = "extract", entities = ?entities, "entities extracted");
            ctx.with_entities(entities)
        }
        Err(e) => {
            tracing::warn!(stage = "extract", error = %e, "entity extraction failed");
            ctx.with_entities(ExtractedEntities::default())
                .with_warning(Some(format!("entity extraction failed: {e}")))
        }
    }
}

fn match_availability(state: &AppState, ctx: TurnContext) -> TurnContext {
    let Some(intent) = ctx.intent.as_ref().map(|i| i.intent) else {
        return ctx;
    };
    let filtered = state
        .matcher
        .filter(&ctx.request.agenda, &ctx.entities, intent, ctx.now);
    ctx.with_filtered(filtered)
}

/// Both classifiers must have produced a result before generation runs.
pub fn validation_gate(ctx: &TurnContext) -> Result<(SentimentResult, IntentResult), TurnError> {
    match (&ctx.sentiment, &ctx.intent) {
        (Some(s), Some(i)) => Ok((s.clone(), i.clone())),
        (None, None) => Err(TurnError::ValidationGate(
            "sentiment and intent were not classified".to_string(),
        )),
        (None, _) => Err(TurnError::ValidationGate("sentiment was not classified".to_string())),
        (_, None) => Err(TurnError::ValidationGate("intent was not classified".to_string())),
    }
}

async fn respond(
    state: &AppState,
    ctx: &TurnContext,
    sentiment: &SentimentResult,
    intent: &IntentResult,
) -> Result<GeneratedReply, TurnError> {
    let agenda_text = ctx.agenda_text();
    let prompt = build_system_prompt(&PromptContext {
        company: &ctx.request.company_config,
        customer: ctx.customer.as_ref(),
        is_data_complete: ctx.is_data_complete,
        require_email: state.integrity.requires_email(),
        intent: intent.intent,
        sentiment: sentiment.sentiment,
        agenda_text: &agenda_text,
        now: ctx.now,
    });
    let reply = generate_reply(
        state.llm.as_ref(),
        &prompt,
        &ctx.history,
        &ctx.request.user_message,
    )
    .await?;
    Ok(reply)
}

fn decide(
    ctx: &TurnContext,
    sentiment: &SentimentResult,
    intent: &IntentResult,
    reply: GeneratedReply,
) -> Decision {
    let mut warnings = ctx.warnings.clone();
    warnings.extend(reply.warning.clone());

    let status = match CrmStatus::parse(&reply.kanban_status) {
        Some(status) => status,
        None => {
            tracing::warn!(stage = "reconcile", status = %reply.kanban_status, "unrecognised status");
            warnings.push(format!(
                "unrecognised status `{}`, using InService",
                reply.kanban_status
            ));
            CrmStatus::InService
        }
    };

    let reconciled = reconcile(
        &reply.directive,
        status,
        &ctx.request.agenda,
        ctx.filtered.as_ref(),
    );
    warnings.extend(reconciled.notes);

    Decision {
        session_id: ctx.request.session_id.clone(),
        company_id: ctx.request.company_id.clone(),
        reply_text: reply.response_text,
        status,
        directive: reconciled.directive,
        metadata: DecisionMetadata {
            intent: intent.intent,
            sentiment: sentiment.sentiment,
            token_counts: ctx.usage.add(reply.usage.prompt, reply.usage.completion),
            warnings,
        },
    }
}

fn persist(
    state: &AppState,
    ctx: &TurnContext,
    sentiment: &SentimentResult,
    intent: &IntentResult,
    decision: &Decision,
    now_utc: NaiveDateTime,
) -> anyhow::Result<()> {
    let record = TurnRecord {
        session_id: &ctx.request.session_id,
        company_id: &ctx.request.company_id,
        user_message: &ctx.request.user_message,
        append_user_message: !ctx.request.already_recorded,
        customer: ctx.customer.as_ref(),
        sentiment,
        intent,
        decision,
    };
    let conn = state.db()?;
    sessions::record_turn(&conn, &record, now_utc, state.session_ttl())?;

    let tokens = &decision.metadata.token_counts;
    let usage = UsageRecord {
        company_id: ctx.request.company_id.clone(),
        session_id: ctx.request.session_id.clone(),
        model: state.config.reply_model().to_string(),
        input_tokens: tokens.prompt,
        output_tokens: tokens.completion,
        recorded_at: now_utc,
    };
    if let Err(e) = crate::db::queries::insert_usage(&conn, &usage) {
        tracing::warn!(stage = "persist", error = %e, "token usage not recorded");
    }
    Ok(())
}

/// Runs every stage in order. `now_utc` stamps storage; `now_local` drives
/// availability and the prompt clock.
pub async fn run_turn(
    state: &AppState,
    request: TurnRequest,
    now_utc: NaiveDateTime,
    now_local: NaiveDateTime,
) -> Result<Decision, TurnError> {
    let session_id = request.session_id.clone();
    tracing::info!(stage = "load_context", session_id = %session_id, "turn started");

    let ctx = load_context(state, request, now_utc, now_local);
    let ctx = check_integrity(state, ctx);
    let ctx = classify(state, ctx).await;
    let ctx = extract_entities(state, ctx);
    let ctx = match_availability(state, ctx);

    let (sentiment, intent) = validation_gate(&ctx)?;
    let reply = respond(state, &ctx, &sentiment, &intent).await?;
    let mut decision = decide(&ctx, &sentiment, &intent, reply);

    if let Err(e) = persist(state, &ctx, &sentiment, &intent, &decision, now_utc) {
        tracing::error!(stage = "persist", session_id = %session_id, error = %e, "session save failed");
        decision
            .metadata
            .warnings
            .push(format!("session save failed: {e}"));
    }

    tracing::info!(
        session_id = %session_id,
        status = decision.status.as_str(),
        directive = decision.directive.kind(),
        tokens = decision.metadata.token_counts.total,
        "turn finished"
    );
    Ok(decision)
}

/// Like `run_turn` but never fails: a fatal error becomes the fixed
/// fallback reply.
pub async fn handle_turn(
    state: &AppState,
    request: TurnRequest,
    now_utc: NaiveDateTime,
    now_local: NaiveDateTime,
) -> Decision {
    let session_id = request.session_id.clone();
    let company_id = request.company_id.clone();
    match run_turn(state, request, now_utc, now_local).await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::error!(session_id = %session_id, error = %e, "turn failed, returning fallback");
            Decision::fallback(&session_id, &company_id, vec![e.to_string()])
        }
    }
}
