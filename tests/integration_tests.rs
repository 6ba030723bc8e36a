use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

use booking_agent::config::AppConfig;
use booking_agent::db;
use booking_agent::handlers;
use booking_agent::models::{Decision, DeferredJob};
use booking_agent::services::ai::{ChatOptions, Completion, LlmProvider, Message};
use booking_agent::services::delivery::{DeliveryError, DeliveryTransport};
use booking_agent::services::worker::{self, JobOutcome, SkipReason};
use booking_agent::state::AppState;

// ── Mock Providers ──

const GENERATED: &str = r#"{"response_text":"Our cleaning costs 180.","kanban_status":"Dúvida/Info","directives":{"type":"normal"}}"#;

#[derive(Clone, Default)]
struct MockLlm {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn chat(
        &self,
        system_prompt: &str,
        _messages: &[Message],
        _options: &ChatOptions,
    ) -> anyhow::Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = if system_prompt.contains("sentiment analysis specialist") {
            r#"{"sentiment":"NEUTRAL","score":50,"confidence":"medium"}"#
        } else if system_prompt.contains("intent classification specialist") {
            r#"{"intent":"INFO","reason":"asks about price"}"#
        } else {
            GENERATED
        };
        Ok(Completion {
            content: content.to_string(),
            prompt_tokens: 100,
            completion_tokens: 20,
        })
    }
}

/// Answers with the scripted HTTP statuses, then 200s.
#[derive(Clone, Default)]
struct MockTransport {
    statuses: Arc<Mutex<VecDeque<u16>>>,
    delivered: Arc<Mutex<Vec<Decision>>>,
    attempts: Arc<AtomicUsize>,
}

impl MockTransport {
    fn failing(statuses: &[u16]) -> Self {
        Self {
            statuses: Arc::new(Mutex::new(statuses.iter().copied().collect())),
            ..Self::default()
        }
    }
}

#[async_trait]
impl DeliveryTransport for MockTransport {
    fn endpoint(&self) -> &str {
        "http://backend.test/webhook"
    }

    async fn deliver(&self, decision: &Decision) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.statuses.lock().unwrap().pop_front() {
            Some(code) => Err(DeliveryError::Status(code)),
            None => {
                self.delivered.lock().unwrap().push(decision.clone());
                Ok(())
            }
        }
    }
}

// ── Helpers ──

fn test_state(
    llm: &MockLlm,
    transport: &MockTransport,
) -> (Arc<AppState>, mpsc::Receiver<DeferredJob>) {
    let conn = db::init_db(":memory:").unwrap();
    let (state, rx) = AppState::build(
        conn,
        AppConfig::for_tests(),
        Box::new(llm.clone()),
        Box::new(transport.clone()),
    )
    .unwrap();
    (Arc::new(state), rx)
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/chat", post(handlers::chat::chat))
        .route(
            "/sessions/:session_id/owner",
            post(handlers::owner::owner_message),
        )
        .route(
            "/api/admin/dead-letters",
            get(handlers::admin::list_dead_letters),
        )
        .route(
            "/api/admin/dead-letters/:id/reprocessed",
            post(handlers::admin::mark_reprocessed),
        )
        .route(
            "/metrics/:company_id/usage",
            get(handlers::metrics::usage),
        )
        .with_state(state)
}

fn chat_body(message: &str) -> Value {
    json!({
        "company_id": "c1",
        "session_id": "s1",
        "user_message": message,
        "customer_profile": {"phone": "5511999998888", "name": "Maria Souza"},
        "agenda": {
            "professionals": {"A1": {"name": "Ana", "services": ["S1"]}},
            "services": {"S1": {"name": "Cleaning", "duration": 60, "price": 180}},
            "availability": {"A1": {"S1": {"2030-01-15": ["09:00", "10:00"]}}}
        }
    })
}

fn json_request(method: &str, uri: &str, body: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn admin_get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn read_json(res: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn take_over(app: &Router, message: &str) {
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/sessions/s1/owner",
            &json!({"company_id": "c1", "message": message}),
            Some("test-token"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

// ── Surface ──

#[tokio::test]
async fn test_health() {
    let (state, _rx) = test_state(&MockLlm::default(), &MockTransport::default());
    let res = test_app(state)
        .oneshot(admin_get("/health", None))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "booking-agent");
}

#[tokio::test]
async fn test_chat_returns_decision() {
    let llm = MockLlm::default();
    let (state, _rx) = test_state(&llm, &MockTransport::default());

    let res = test_app(state)
        .oneshot(json_request("POST", "/chat", &chat_body("hmm, tell me more"), None))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["reply_text"], "Our cleaning costs 180.");
    assert_eq!(body["status"], "Inquiry");
    assert_eq!(body["directive"]["type"], "normal");
    assert_eq!(body["metadata"]["intent"], "INFO");
    // Both classifiers fell through to the model, then generation.
    assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
    assert_eq!(body["metadata"]["token_counts"]["total"], 360);
}

#[tokio::test]
async fn test_chat_rejects_empty_message() {
    let (state, _rx) = test_state(&MockLlm::default(), &MockTransport::default());
    let res = test_app(state)
        .oneshot(json_request("POST", "/chat", &chat_body("   "), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_owner_takeover_requires_auth() {
    let (state, _rx) = test_state(&MockLlm::default(), &MockTransport::default());
    let res = test_app(state)
        .oneshot(json_request(
            "POST",
            "/sessions/s1/owner",
            &json!({"company_id": "c1", "message": "hi"}),
            Some("wrong-token"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_usage_metrics_after_turn() {
    let (state, _rx) = test_state(&MockLlm::default(), &MockTransport::default());
    let app = test_app(state);

    let res = app
        .clone()
        .oneshot(json_request("POST", "/chat", &chat_body("hmm, tell me more"), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(admin_get("/metrics/c1/usage?period=total", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .clone()
        .oneshot(admin_get("/metrics/c1/usage?period=weekly", Some("test-token")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(admin_get("/metrics/c1/usage?period=total", Some("test-token")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["company_id"], "c1");
    assert_eq!(body["period"], "total");
    assert_eq!(body["data"][0]["period"], "TOTAL");
    assert_eq!(body["data"][0]["interactions"], 1);
    assert_eq!(body["data"][0]["tokens"]["input"], 300);
    assert_eq!(body["data"][0]["tokens"]["output"], 60);
    assert_eq!(body["data"][0]["tokens"]["total"], 360);

    let res = app
        .oneshot(admin_get("/metrics/other/usage", Some("test-token")))
        .await
        .unwrap();
    let body = read_json(res).await;
    assert_eq!(body["period"], "daily");
    assert_eq!(body["data"], json!([]));
}

// ── Deferred path ──

#[tokio::test]
async fn test_paused_session_defers_turn() {
    let llm = MockLlm::default();
    let (state, mut rx) = test_state(&llm, &MockTransport::default());
    let app = test_app(state);

    take_over(&app, "I'll take it from here").await;

    let res = app
        .clone()
        .oneshot(json_request("POST", "/chat", &chat_body("hmm, tell me more"), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body = read_json(res).await;
    assert_eq!(body["status"], "deferred");
    assert!(body["resume_at"].is_string());

    let job = rx.try_recv().unwrap();
    assert_eq!(job.request.session_id, "s1");
    assert!(job.request.already_recorded);
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_owner_still_in_control_blocks_resume() {
    let llm = MockLlm::default();
    let transport = MockTransport::default();
    let (state, mut rx) = test_state(&llm, &transport);
    let app = test_app(state.clone());

    take_over(&app, "I'll take it from here").await;
    app.clone()
        .oneshot(json_request("POST", "/chat", &chat_body("hmm, tell me more"), None))
        .await
        .unwrap();
    take_over(&app, "one more thing").await;
    let job = rx.try_recv().unwrap();

    let now = Utc::now().naive_utc() + Duration::minutes(10);
    let outcome = worker::process_job(&state, job, now, now).await;

    assert_eq!(outcome, JobOutcome::Skipped(SkipReason::StillPaused));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_resumed_job_is_delivered() {
    let llm = MockLlm::default();
    let transport = MockTransport::default();
    let (state, mut rx) = test_state(&llm, &transport);
    let app = test_app(state.clone());

    take_over(&app, "I'll take it from here").await;
    app.clone()
        .oneshot(json_request("POST", "/chat", &chat_body("hmm, tell me more"), None))
        .await
        .unwrap();
    let job = rx.try_recv().unwrap();

    let later = Utc::now().naive_utc() + Duration::minutes(31);
    let outcome = worker::process_job(&state, job, later, later).await;

    assert_eq!(outcome, JobOutcome::Delivered { attempts: 1 });
    let delivered = transport.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].session_id, "s1");
}

#[tokio::test]
async fn test_failed_delivery_lands_in_dead_letters() {
    let llm = MockLlm::default();
    let transport = MockTransport::failing(&[503, 503, 503]);
    let (state, mut rx) = test_state(&llm, &transport);
    let app = test_app(state.clone());

    take_over(&app, "I'll take it from here").await;
    app.clone()
        .oneshot(json_request("POST", "/chat", &chat_body("hmm, tell me more"), None))
        .await
        .unwrap();
    let job = rx.try_recv().unwrap();

    let later = Utc::now().naive_utc() + Duration::minutes(31);
    let outcome = worker::process_job(&state, job, later, later).await;
    assert_eq!(outcome, JobOutcome::DeadLettered { attempts: 3 });
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);

    let res = app
        .clone()
        .oneshot(admin_get("/api/admin/dead-letters", None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .clone()
        .oneshot(admin_get("/api/admin/dead-letters?session_id=s1", Some("test-token")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let letters = read_json(res).await;
    let letters = letters.as_array().unwrap();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0]["attempts"], 3);
    assert_eq!(letters[0]["endpoint"], "http://backend.test/webhook");
    assert_eq!(letters[0]["payload"]["reply_text"], "Our cleaning costs 180.");
    assert_eq!(letters[0]["reprocessed"], false);

    let id = letters[0]["id"].as_str().unwrap().to_string();
    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/api/admin/dead-letters/{id}/reprocessed"),
            &json!({}),
            Some("test-token"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/admin/dead-letters/missing/reprocessed",
            &json!({}),
            Some("test-token"),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .oneshot(admin_get("/api/admin/dead-letters", Some("test-token")))
        .await
        .unwrap();
    let letters = read_json(res).await;
    assert_eq!(letters[0]["reprocessed"], true);
}
