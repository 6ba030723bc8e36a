use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;

use super::{DeliveryError, DeliveryTransport};
use crate::models::Decision;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Base64 HMAC-SHA1 of the body under the shared secret.
pub fn sign_body(secret: &str, body: &[u8]) -> Result<String, DeliveryError> {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes())
        .map_err(|e| DeliveryError::InvalidRequest(e.to_string()))?;
    mac.update(body);
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

pub struct WebhookTransport {
    url: String,
    secret: String,
    client: reqwest::Client,
}

impl WebhookTransport {
    pub fn new(url: String, secret: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { url, secret, client })
    }
}

#[async_trait]
impl DeliveryTransport for WebhookTransport {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn deliver(&self, decision: &Decision) -> Result<(), DeliveryError> {
        if self.url.trim().is_empty() {
            return Err(DeliveryError::MissingEndpoint);
        }

        let body =
            serde_json::to_vec(decision).map_err(|e| DeliveryError::Serialization(e.to_string()))?;
        let signature = sign_body(&self.secret, &body)?;

        let resp = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Token", &self.secret)
            .header("X-Webhook-Signature", signature)
            .header("X-Session-Id", &decision.session_id)
            .header("X-Company-Id", &decision.company_id)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    DeliveryError::InvalidRequest(e.to_string())
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_stable() {
        let a = sign_body("secret", b"{\"a\":1}").unwrap();
        let b = sign_body("secret", b"{\"a\":1}").unwrap();
        let c = sign_body("other", b"{\"a\":1}").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        // 20-byte digest encodes to 28 base64 chars.
        assert_eq!(a.len(), 28);
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_not_retryable() {
        let transport = WebhookTransport::new(String::new(), "secret".to_string()).unwrap();
        let err = transport
            .deliver(&Decision::fallback("s1", "c1", vec![]))
            .await
            .unwrap_err();
        assert_eq!(err, DeliveryError::MissingEndpoint);
        assert!(!err.is_retryable());
    }
}
