use std::time::Duration;

use super::{DeliveryError, DeliveryTransport};
use crate::models::Decision;

/// Bounded exponential backoff. `delay_for(n)` is the wait after the n-th
/// failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let factor = self.multiplier.saturating_pow(exponent);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug)]
pub struct DeliveryReport {
    pub attempts: u32,
    pub result: Result<(), DeliveryError>,
}

pub async fn deliver_with_retry(
    transport: &dyn DeliveryTransport,
    decision: &Decision,
    policy: &RetryPolicy,
) -> DeliveryReport {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match transport.deliver(decision).await {
            Ok(()) => {
                tracing::info!(
                    session_id = %decision.session_id,
                    attempt,
                    "decision delivered"
                );
                return DeliveryReport {
                    attempts: attempt,
                    result: Ok(()),
                };
            }
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    session_id = %decision.session_id,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                tracing::error!(
                    session_id = %decision.session_id,
                    attempt,
                    error = %e,
                    "delivery gave up"
                );
                return DeliveryReport {
                    attempts: attempt,
                    result: Err(e),
                };
            }
        }
    }
}
