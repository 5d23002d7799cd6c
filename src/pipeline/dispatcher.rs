//! Fan-out of one notification to its destination plus the default.
//!
//! Targets, in order:
//! 1. The resolved destination, if it has a non-empty endpoint.
//! 2. The default destination, always, exactly once.
//!
//! Each target gets one attempt. Non-2xx statuses and transport errors are
//! recorded as `DeliveryResult::Failed` and the next target is still tried.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::pipeline::payload::WebhookPayload;
use crate::pipeline::types::{
    DeliveryResult, DestinationKey, DispatchOutcome, Notification, WebhookTransport,
};

/// Longest response body kept in a failure reason.
const MAX_REASON_BODY: usize = 300;

/// Destination endpoints resolved from configuration.
#[derive(Debug, Clone)]
pub struct DestinationTable {
    default_key: DestinationKey,
    default_endpoint: String,
    endpoints: HashMap<DestinationKey, String>,
}

impl DestinationTable {
    pub fn new(default_endpoint: impl Into<String>) -> Self {
        Self {
            default_key: DestinationKey::new("General"),
            default_endpoint: default_endpoint.into(),
            endpoints: HashMap::new(),
        }
    }

    pub fn with_endpoint(mut self, key: impl Into<DestinationKey>, url: impl Into<String>) -> Self {
        self.insert(key.into(), url.into());
        self
    }

    pub fn insert(&mut self, key: DestinationKey, url: String) {
        self.endpoints.insert(key, url);
    }

    pub fn default_key(&self) -> &DestinationKey {
        &self.default_key
    }

    pub fn default_endpoint(&self) -> &str {
        &self.default_endpoint
    }

    /// Endpoint for `key`; empty endpoints count as unset.
    pub fn endpoint(&self, key: &DestinationKey) -> Option<&str> {
        self.endpoints
            .get(key)
            .map(|url| url.trim())
            .filter(|url| !url.is_empty())
    }

    /// Number of configured (non-empty) destination endpoints, default excluded.
    pub fn configured(&self) -> usize {
        self.endpoints.keys().filter(|k| self.endpoint(k).is_some()).count()
    }
}

/// One delivery target for a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    pub name: String,
    pub url: String,
}

pub struct Dispatcher {
    transport: Arc<dyn WebhookTransport>,
    destinations: DestinationTable,
    bot_name: String,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn WebhookTransport>,
        destinations: DestinationTable,
        bot_name: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            destinations,
            bot_name: bot_name.into(),
        }
    }

    pub fn destinations(&self) -> &DestinationTable {
        &self.destinations
    }

    /// Display identity, e.g. `Huly Bot — Alois Lab` or `Huly Bot — unknown`.
    pub fn username(&self, destination: Option<&DestinationKey>) -> String {
        format!(
            "{} — {}",
            self.bot_name,
            destination.map_or("unknown", DestinationKey::as_str)
        )
    }

    /// Ordered target list: primary (if resolved and configured), then default.
    pub fn targets(&self, destination: Option<&DestinationKey>) -> Vec<DeliveryTarget> {
        let mut targets = Vec::with_capacity(2);

        if let Some(key) = destination.filter(|k| *k != self.destinations.default_key())
            && let Some(url) = self.destinations.endpoint(key)
        {
            targets.push(DeliveryTarget {
                name: key.to_string(),
                url: url.to_string(),
            });
        }

        targets.push(DeliveryTarget {
            name: self.destinations.default_key().to_string(),
            url: self.destinations.default_endpoint().to_string(),
        });

        targets
    }

    /// Deliver `notification` to every target sequentially. Never fails.
    pub async fn dispatch(
        &self,
        notification: &Notification,
        destination: Option<&DestinationKey>,
    ) -> Vec<DispatchOutcome> {
        let payload = WebhookPayload::from_notification(notification, self.username(destination));
        let targets = self.targets(destination);

        debug!(
            targets = targets.len(),
            channel = destination.map_or("unknown", DestinationKey::as_str),
            "Posting notification"
        );

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            let result = self.deliver(&target, &payload).await;
            outcomes.push(DispatchOutcome {
                target: target.name,
                url: target.url,
                result,
            });
        }
        outcomes
    }

    async fn deliver(&self, target: &DeliveryTarget, payload: &WebhookPayload) -> DeliveryResult {
        match self.transport.post_json(&target.url, payload).await {
            Ok(resp) if (200..300).contains(&resp.status) => {
                debug!(status = resp.status, target = %target.name, "Posted notification");
                DeliveryResult::Delivered {
                    status: resp.status,
                }
            }
            Ok(resp) => {
                let body: String = resp.body.chars().take(MAX_REASON_BODY).collect();
                warn!(
                    status = resp.status,
                    target = %target.name,
                    body = %body,
                    "Webhook POST failed"
                );
                DeliveryResult::Failed {
                    status: Some(resp.status),
                    reason: format!("HTTP {}: {body}", resp.status),
                }
            }
            Err(e) => {
                error!(target = %target.name, error = %e, "Webhook transport error");
                DeliveryResult::Failed {
                    status: None,
                    reason: e.to_string(),
                }
            }
        }
    }
}
