use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::models::DeferredJob;
use crate::services::ai::intent::IntentClassifier;
use crate::services::ai::sentiment::SentimentClassifier;
use crate::services::ai::LlmProvider;
use crate::services::availability::AvailabilityMatcher;
use crate::services::cache::MemoryCache;
use crate::services::delivery::retry::RetryPolicy;
use crate::services::delivery::DeliveryTransport;
use crate::services::entities::EntityExtractor;
use crate::services::integrity::IntegrityGate;

/// Deferred jobs waiting for a worker slot.
const DEFERRED_QUEUE_CAPACITY: usize = 256;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub llm: Box<dyn LlmProvider>,
    pub transport: Box<dyn DeliveryTransport>,
    pub sentiment: SentimentClassifier,
    pub intent: IntentClassifier,
    pub extractor: EntityExtractor,
    pub integrity: IntegrityGate,
    pub matcher: AvailabilityMatcher,
    pub retry: RetryPolicy,
    pub deferred_tx: mpsc::Sender<DeferredJob>,
}

impl AppState {
    /// Wires the pipeline components. The receiver half goes to the
    /// deferred-delivery worker.
    pub fn build(
        conn: Connection,
        config: AppConfig,
        llm: Box<dyn LlmProvider>,
        transport: Box<dyn DeliveryTransport>,
    ) -> anyhow::Result<(Self, mpsc::Receiver<DeferredJob>)> {
        let (deferred_tx, deferred_rx) = mpsc::channel(DEFERRED_QUEUE_CAPACITY);

        let sentiment = SentimentClassifier::new(
            Arc::new(MemoryCache::new()),
            Duration::from_secs(config.sentiment_cache_ttl_secs),
            config.tool_model.clone(),
        )?;
        let intent = IntentClassifier::new(
            Arc::new(MemoryCache::new()),
            Duration::from_secs(config.intent_cache_ttl_secs),
            config.tool_model.clone(),
        )?;

        let state = Self {
            db: Arc::new(Mutex::new(conn)),
            sentiment,
            intent,
            extractor: EntityExtractor::new()?,
            integrity: IntegrityGate::new(config.integrity_require_email)?,
            matcher: AvailabilityMatcher::new(config.max_results),
            retry: RetryPolicy::new(
                config.delivery_max_attempts,
                Duration::from_millis(config.delivery_base_delay_ms),
            ),
            config,
            llm,
            transport,
            deferred_tx,
        };
        Ok((state, deferred_rx))
    }

    pub fn db(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.config.session_ttl_hours)
    }

    pub fn owner_pause(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.config.owner_pause_minutes)
    }
}
