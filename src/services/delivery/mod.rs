pub mod retry;
#[cfg(test)]
pub(crate) mod testing;
pub mod webhook;

use async_trait::async_trait;

use crate::models::Decision;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeliveryError {
    #[error("endpoint returned HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("payload serialization failed: {0}")]
    Serialization(String),

    #[error("invalid delivery request: {0}")]
    InvalidRequest(String),

    #[error("no delivery endpoint configured")]
    MissingEndpoint,
}

impl DeliveryError {
    /// Anything that reached the wire may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Status(_) | DeliveryError::Transport(_))
    }
}

/// Forwards a finished decision to the backend that executes it.
#[async_trait]
pub trait DeliveryTransport: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn deliver(&self, decision: &Decision) -> Result<(), DeliveryError>;
}
