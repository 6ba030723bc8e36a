use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{DeliveryError, DeliveryTransport};
use crate::models::Decision;

/// Pops scripted outcomes (success once they run out) and keeps every
/// decision it was handed.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    outcomes: Arc<Mutex<VecDeque<Result<(), DeliveryError>>>>,
    attempts: Arc<Mutex<Vec<Decision>>>,
}

impl RecordingTransport {
    pub fn new(outcomes: Vec<Result<(), DeliveryError>>) -> Self {
        Self {
            outcomes: Arc::new(Mutex::new(outcomes.into())),
            attempts: Arc::default(),
        }
    }

    pub fn attempts(&self) -> Vec<Decision> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryTransport for RecordingTransport {
    fn endpoint(&self) -> &str {
        "http://backend.test/webhook"
    }

    async fn deliver(&self, decision: &Decision) -> Result<(), DeliveryError> {
        self.attempts.lock().unwrap().push(decision.clone());
        self.outcomes.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}
