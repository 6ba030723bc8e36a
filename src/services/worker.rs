//! Deferred-delivery worker. Turns that arrived during an operator pause are
//! queued here, re-checked when the pause ends, answered through the normal
//! pipeline and pushed to the backend webhook.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, Utc};
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use crate::db::queries;
use crate::models::session::resume_decision;
use crate::models::{DeadLetterRecord, Decision, DeferredJob, ResumeDecision};
use crate::services::delivery::retry::deliver_with_retry;
use crate::services::pipeline;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    StillPaused,
    OwnerTookOver,
    SessionMissing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Skipped(SkipReason),
    TurnFailed(String),
    Delivered { attempts: u32 },
    DeadLettered { attempts: u32 },
    TimedOut,
}

/// Drains the queue until every sender is dropped. Each job waits for its
/// due time outside the concurrency limit.
pub async fn run(state: Arc<AppState>, mut rx: mpsc::Receiver<DeferredJob>) {
    let slots = Arc::new(Semaphore::new(state.config.worker_concurrency.max(1)));
    tracing::info!(
        concurrency = state.config.worker_concurrency,
        "deferred delivery worker started"
    );

    while let Some(job) = rx.recv().await {
        let state = state.clone();
        let slots = slots.clone();
        tokio::spawn(async move {
            wait_until(job.due_at).await;
            let Ok(_permit) = slots.acquire_owned().await else {
                return;
            };
            let job_id = job.id;
            let limit = Duration::from_secs(state.config.job_timeout_secs);
            let now_utc = Utc::now().naive_utc();
            let now_local = state.config.local_now();

            let outcome = run_job(&state, job, limit, now_utc, now_local).await;
            tracing::info!(job_id = %job_id, outcome = ?outcome, "deferred job finished");
        });
    }

    tracing::info!("deferred delivery queue closed");
}

async fn wait_until(due_at: NaiveDateTime) {
    let remaining = (due_at - Utc::now().naive_utc())
        .to_std()
        .unwrap_or(Duration::ZERO);
    if !remaining.is_zero() {
        tokio::time::sleep(remaining).await;
    }
}

/// Like `process_job`, but the resume check and pipeline run must finish
/// within `limit`. Delivery runs outside the limit so an exhausted retry
/// budget always ends in a dead letter.
pub async fn run_job(
    state: &AppState,
    job: DeferredJob,
    limit: Duration,
    now_utc: NaiveDateTime,
    now_local: NaiveDateTime,
) -> JobOutcome {
    let job_id = job.id;
    match tokio::time::timeout(limit, prepare(state, job, now_utc, now_local)).await {
        Ok(Ok(decision)) => deliver(state, job_id, decision).await,
        Ok(Err(outcome)) => outcome,
        Err(_) => {
            tracing::warn!(job_id = %job_id, ?limit, "deferred turn timed out");
            JobOutcome::TimedOut
        }
    }
}

/// Resume check, pipeline run and delivery for one job. A stale pause or an
/// operator reply ends the job before anything is generated or sent.
pub async fn process_job(
    state: &AppState,
    job: DeferredJob,
    now_utc: NaiveDateTime,
    now_local: NaiveDateTime,
) -> JobOutcome {
    let job_id = job.id;
    match prepare(state, job, now_utc, now_local).await {
        Ok(decision) => deliver(state, job_id, decision).await,
        Err(outcome) => outcome,
    }
}

/// Everything up to a decision ready to send; `Err` is the job's final outcome.
async fn prepare(
    state: &AppState,
    job: DeferredJob,
    now_utc: NaiveDateTime,
    now_local: NaiveDateTime,
) -> Result<Decision, JobOutcome> {
    let session_id = job.request.session_id.clone();

    let stored = state
        .db()
        .and_then(|conn| queries::get_session(&conn, &session_id, &now_utc));
    let session = match stored {
        Ok(Some(session)) => session,
        Ok(None) => {
            tracing::warn!(job_id = %job.id, session_id = %session_id, "session gone, dropping job");
            return Err(JobOutcome::Skipped(SkipReason::SessionMissing));
        }
        Err(e) => {
            tracing::error!(job_id = %job.id, error = %e, "session reload failed");
            return Err(JobOutcome::TurnFailed(e.to_string()));
        }
    };

    match resume_decision(session.pause, session.last_sender, now_utc) {
        ResumeDecision::Resume => {}
        ResumeDecision::StillPaused { until } => {
            tracing::info!(job_id = %job.id, session_id = %session_id, %until, "pause extended, skipping");
            return Err(JobOutcome::Skipped(SkipReason::StillPaused));
        }
        ResumeDecision::OwnerTookOver => {
            tracing::info!(job_id = %job.id, session_id = %session_id, "operator replied, skipping");
            return Err(JobOutcome::Skipped(SkipReason::OwnerTookOver));
        }
    }

    pipeline::run_turn(state, job.request, now_utc, now_local)
        .await
        .map_err(|e| {
            tracing::error!(job_id = %job.id, session_id = %session_id, error = %e, "deferred turn failed");
            JobOutcome::TurnFailed(e.to_string())
        })
}

async fn deliver(state: &AppState, job_id: Uuid, decision: Decision) -> JobOutcome {
    let report = deliver_with_retry(state.transport.as_ref(), &decision, &state.retry).await;
    let err = match report.result {
        Ok(()) => {
            return JobOutcome::Delivered {
                attempts: report.attempts,
            }
        }
        Err(e) => e,
    };

    let payload = match serde_json::to_value(&decision) {
        Ok(value) => value,
        Err(e) => serde_json::json!({ "unserializable": e.to_string() }),
    };
    let record = DeadLetterRecord {
        id: Uuid::new_v4().to_string(),
        session_id: decision.session_id.clone(),
        company_id: decision.company_id.clone(),
        endpoint: state.transport.endpoint().to_string(),
        payload,
        error: err.to_string(),
        attempts: report.attempts,
        failed_at: Utc::now().naive_utc(),
        reprocessed: false,
    };
    let saved = state
        .db()
        .and_then(|conn| queries::insert_dead_letter(&conn, &record));
    match saved {
        Ok(()) => tracing::warn!(
            job_id = %job_id,
            dead_letter_id = %record.id,
            attempts = report.attempts,
            error = %err,
            "delivery dead-lettered"
        ),
        Err(e) => tracing::error!(
            job_id = %job_id,
            error = %e,
            "failed to store dead letter"
        ),
    }

    JobOutcome::DeadLettered {
        attempts: report.attempts,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::config::AppConfig;
    use crate::db;
    use crate::models::agenda::fixtures::sample_agenda;
    use crate::models::TurnRequest;
    use crate::services::ai::testing::ScriptedLlm;
    use crate::services::delivery::testing::RecordingTransport;
    use crate::services::delivery::DeliveryError;
    use crate::services::sessions;

    const REPLY: &str = r#"{"response_text":"It costs 180.","kanban_status":"Inquiry","directives":{"type":"normal"}}"#;
    const MESSAGE: &str = "Thanks! What is the price?";

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn state_with(llm: &ScriptedLlm, transport: &RecordingTransport) -> AppState {
        state_with_config(llm, transport, AppConfig::for_tests())
    }

    fn state_with_config(
        llm: &ScriptedLlm,
        transport: &RecordingTransport,
        config: AppConfig,
    ) -> AppState {
        let conn = db::init_db(":memory:").unwrap();
        let (state, _rx) = AppState::build(
            conn,
            config,
            Box::new(llm.clone()),
            Box::new(transport.clone()),
        )
        .unwrap();
        state
    }

    fn job(due_at: NaiveDateTime) -> DeferredJob {
        DeferredJob::new(
            TurnRequest {
                company_id: "c1".to_string(),
                session_id: "s1".to_string(),
                user_message: MESSAGE.to_string(),
                company_config: Default::default(),
                customer_profile: None,
                agenda: sample_agenda(),
                recent_history: vec![],
                already_recorded: false,
            },
            due_at,
        )
    }

    /// Operator replied at 10:00 (pause until 10:30), customer wrote at 10:05.
    fn seed_paused_session(state: &AppState) {
        let conn = state.db().unwrap();
        let ttl = ChronoDuration::hours(24);
        sessions::record_owner_message(
            &conn,
            "s1",
            "c1",
            "I'll handle this one",
            dt("2025-12-10 10:00"),
            ChronoDuration::minutes(30),
            ttl,
        )
        .unwrap();
        sessions::record_user_message(&conn, "s1", "c1", MESSAGE, None, dt("2025-12-10 10:05"), ttl)
            .unwrap();
    }

    #[tokio::test]
    async fn test_resumes_and_delivers_after_pause() {
        let llm = ScriptedLlm::new(vec![Ok(REPLY.to_string())]);
        let transport = RecordingTransport::default();
        let state = state_with(&llm, &transport);
        seed_paused_session(&state);

        let now = dt("2025-12-10 10:31");
        let outcome = process_job(&state, job(dt("2025-12-10 10:30")), now, now).await;

        assert_eq!(outcome, JobOutcome::Delivered { attempts: 1 });
        let sent = transport.attempts();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reply_text, "It costs 180.");
    }

    #[tokio::test]
    async fn test_extended_pause_skips_without_side_effects() {
        let llm = ScriptedLlm::new(vec![Ok(REPLY.to_string())]);
        let transport = RecordingTransport::default();
        let state = state_with(&llm, &transport);
        seed_paused_session(&state);
        {
            let conn = state.db().unwrap();
            sessions::record_owner_message(
                &conn,
                "s1",
                "c1",
                "still on it",
                dt("2025-12-10 10:20"),
                ChronoDuration::minutes(30),
                ChronoDuration::hours(24),
            )
            .unwrap();
        }

        let now = dt("2025-12-10 10:31");
        let outcome = process_job(&state, job(dt("2025-12-10 10:30")), now, now).await;

        assert_eq!(outcome, JobOutcome::Skipped(SkipReason::StillPaused));
        assert_eq!(llm.calls(), 0);
        assert!(transport.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_owner_reply_after_customer_skips() {
        let llm = ScriptedLlm::new(vec![Ok(REPLY.to_string())]);
        let transport = RecordingTransport::default();
        let state = state_with(&llm, &transport);
        seed_paused_session(&state);
        {
            // Short window that has already elapsed, but the operator spoke last.
            let conn = state.db().unwrap();
            sessions::record_owner_message(
                &conn,
                "s1",
                "c1",
                "answered by phone",
                dt("2025-12-10 10:06"),
                ChronoDuration::minutes(1),
                ChronoDuration::hours(24),
            )
            .unwrap();
        }

        let now = dt("2025-12-10 10:31");
        let outcome = process_job(&state, job(dt("2025-12-10 10:30")), now, now).await;

        assert_eq!(outcome, JobOutcome::Skipped(SkipReason::OwnerTookOver));
        assert_eq!(llm.calls(), 0);
        assert!(transport.attempts().is_empty());
    }

    #[tokio::test]
    async fn test_missing_session_is_skipped() {
        let llm = ScriptedLlm::new(vec![]);
        let transport = RecordingTransport::default();
        let state = state_with(&llm, &transport);

        let now = dt("2025-12-10 10:31");
        let outcome = process_job(&state, job(now), now, now).await;
        assert_eq!(outcome, JobOutcome::Skipped(SkipReason::SessionMissing));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_delivery_is_dead_lettered() {
        let llm = ScriptedLlm::new(vec![Ok(REPLY.to_string())]);
        let transport = RecordingTransport::new(vec![
            Err(DeliveryError::Status(503)),
            Err(DeliveryError::Status(503)),
            Err(DeliveryError::Status(503)),
        ]);
        let state = state_with(&llm, &transport);
        seed_paused_session(&state);

        let now = dt("2025-12-10 10:31");
        let outcome = process_job(&state, job(dt("2025-12-10 10:30")), now, now).await;

        assert_eq!(outcome, JobOutcome::DeadLettered { attempts: 3 });
        let conn = state.db().unwrap();
        let letters = queries::list_dead_letters(&conn, Some("s1"), 10).unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].attempts, 3);
        assert_eq!(letters[0].endpoint, "http://backend.test/webhook");
        assert_eq!(letters[0].payload["reply_text"], "It costs 180.");
        assert!(letters[0].error.contains("503"));
        assert!(!letters[0].reprocessed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_retries_outlast_job_timeout_and_still_dead_letter() {
        let llm = ScriptedLlm::new(vec![Ok(REPLY.to_string())]);
        let transport = RecordingTransport::new(vec![
            Err(DeliveryError::Status(503)),
            Err(DeliveryError::Status(503)),
            Err(DeliveryError::Status(503)),
        ]);
        let config = AppConfig {
            job_timeout_secs: 2,
            delivery_base_delay_ms: 1500,
            ..AppConfig::for_tests()
        };
        let limit = Duration::from_secs(config.job_timeout_secs);
        let state = state_with_config(&llm, &transport, config);
        seed_paused_session(&state);

        let now = dt("2025-12-10 10:31");
        let outcome = run_job(&state, job(dt("2025-12-10 10:30")), limit, now, now).await;

        assert_eq!(outcome, JobOutcome::DeadLettered { attempts: 3 });
        assert_eq!(transport.attempts().len(), 3);
        let conn = state.db().unwrap();
        let letters = queries::list_dead_letters(&conn, Some("s1"), 10).unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_turn_failure_delivers_nothing() {
        let llm = ScriptedLlm::new(vec![Err("provider down".to_string())]);
        let transport = RecordingTransport::default();
        let state = state_with(&llm, &transport);
        seed_paused_session(&state);

        let now = dt("2025-12-10 10:31");
        let outcome = process_job(&state, job(dt("2025-12-10 10:30")), now, now).await;

        assert!(matches!(outcome, JobOutcome::TurnFailed(_)));
        assert!(transport.attempts().is_empty());
    }
}
