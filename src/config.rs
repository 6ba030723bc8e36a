use std::env;
use std::str::FromStr;

use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub admin_token: String,
    pub llm_provider: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub tool_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub webhook_url: String,
    pub webhook_secret: String,
    pub sentiment_cache_ttl_secs: u64,
    pub intent_cache_ttl_secs: u64,
    pub max_results: usize,
    pub history_window: usize,
    pub session_ttl_hours: i64,
    pub owner_pause_minutes: i64,
    pub delivery_max_attempts: u32,
    pub delivery_base_delay_ms: u64,
    pub worker_concurrency: usize,
    pub job_timeout_secs: u64,
    pub integrity_require_email: bool,
    pub utc_offset_minutes: i32,
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parsed("PORT", 8000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "booking_agent.db".to_string()),
            admin_token: env::var("ADMIN_TOKEN").unwrap_or_else(|_| "changeme".to_string()),
            llm_provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "ollama".to_string()),
            groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
            groq_model: env::var("GROQ_MODEL")
                .unwrap_or_else(|_| "llama-3.3-70b-versatile".to_string()),
            tool_model: env::var("TOOL_MODEL")
                .unwrap_or_else(|_| "llama-3.1-8b-instant".to_string()),
            ollama_url: env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            ollama_model: env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string()),
            webhook_url: env::var("WEBHOOK_URL").unwrap_or_default(),
            webhook_secret: env::var("WEBHOOK_SECRET").unwrap_or_default(),
            sentiment_cache_ttl_secs: parsed("SENTIMENT_CACHE_TTL_SECS", 3600),
            intent_cache_ttl_secs: parsed("INTENT_CACHE_TTL_SECS", 1800),
            max_results: parsed("MAX_RESULTS", 3),
            history_window: parsed("HISTORY_WINDOW", 4),
            session_ttl_hours: parsed("SESSION_TTL_HOURS", 24),
            owner_pause_minutes: parsed("OWNER_PAUSE_MINUTES", 30),
            delivery_max_attempts: parsed("DELIVERY_MAX_ATTEMPTS", 3),
            delivery_base_delay_ms: parsed("DELIVERY_BASE_DELAY_MS", 500),
            worker_concurrency: parsed("WORKER_CONCURRENCY", 4),
            job_timeout_secs: parsed("JOB_TIMEOUT_SECS", 60),
            integrity_require_email: parsed("INTEGRITY_REQUIRE_EMAIL", false),
            utc_offset_minutes: parsed("UTC_OFFSET_MINUTES", -180),
        }
    }

    /// Wall-clock time in the business's timezone, used for slot filtering.
    pub fn local_now(&self) -> NaiveDateTime {
        let offset =
            FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        Utc::now().with_timezone(&offset).naive_local()
    }

    /// Model name recorded against a turn's token usage.
    pub fn reply_model(&self) -> &str {
        match self.llm_provider.as_str() {
            "groq" => &self.groq_model,
            "ollama" => &self.ollama_model,
            other => other,
        }
    }
}

impl AppConfig {
    /// Deterministic settings for unit and integration tests.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            database_url: ":memory:".to_string(),
            admin_token: "test-token".to_string(),
            llm_provider: "mock".to_string(),
            groq_api_key: String::new(),
            groq_model: String::new(),
            tool_model: "tool".to_string(),
            ollama_url: String::new(),
            ollama_model: String::new(),
            webhook_url: "http://backend.test/webhook".to_string(),
            webhook_secret: "secret".to_string(),
            sentiment_cache_ttl_secs: 3600,
            intent_cache_ttl_secs: 1800,
            max_results: 3,
            history_window: 4,
            session_ttl_hours: 24,
            owner_pause_minutes: 30,
            delivery_max_attempts: 3,
            delivery_base_delay_ms: 10,
            worker_concurrency: 2,
            job_timeout_secs: 5,
            integrity_require_email: false,
            utc_offset_minutes: 0,
        }
    }
}
