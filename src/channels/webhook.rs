//! Webhook transport. One JSON POST per call via reqwest.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::pipeline::payload::WebhookPayload;
use crate::pipeline::types::{TransportResponse, WebhookTransport};

/// reqwest-backed `WebhookTransport`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client. `timeout` of `None` keeps reqwest's default (no total timeout).
    pub fn new(timeout: Option<Duration>) -> Result<Self, DeliveryError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("huly-relay/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| DeliveryError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        payload: &WebhookPayload,
    ) -> Result<TransportResponse, DeliveryError> {
        let resp = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_and_without_timeout() {
        assert!(ReqwestTransport::new(None).is_ok());
        assert!(ReqwestTransport::new(Some(Duration::from_secs(5))).is_ok());
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let transport = ReqwestTransport::new(Some(Duration::from_secs(2))).unwrap();
        let payload = WebhookPayload {
            username: "Huly Bot — unknown".into(),
            embeds: vec![],
            components: vec![],
        };
        // Grab a free port and release it so nothing is listening.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = transport
            .post_json(&format!("http://127.0.0.1:{port}/hook"), &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Transport { .. }));
    }
}
