//! Shared types for the relay pipeline.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, MailboxError};
use crate::pipeline::payload::WebhookPayload;

// ── Inbound message ─────────────────────────────────────────────────

/// Immutable snapshot of one mailbox message for a single processing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    /// Mailbox-native identifier (IMAP UID).
    pub id: String,
    /// Sender address.
    pub from: String,
    /// Subject line, possibly empty.
    pub subject: String,
    /// Message date.
    pub date: DateTime<Utc>,
    /// Plain-text body, possibly empty.
    pub plain_body: String,
    /// HTML body, possibly empty.
    pub html_body: String,
    /// Whether the message was unread when fetched.
    pub unread: bool,
}

// ── Routing ─────────────────────────────────────────────────────────

/// Canonical name of a delivery target, e.g. "Alois Platform".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationKey(String);

impl DestinationKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DestinationKey {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// ── Notification ────────────────────────────────────────────────────

/// One metadata row of a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl NotificationField {
    pub fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline,
        }
    }
}

/// Link-style action control attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    pub label: String,
    pub url: String,
}

/// Structured notification built fresh for each message. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub link: Option<String>,
    pub snippet: String,
    pub fields: Vec<NotificationField>,
    pub action: Option<ActionButton>,
}

// ── Delivery outcomes ───────────────────────────────────────────────

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeliveryResult {
    /// The endpoint answered with a 2xx status.
    Delivered { status: u16 },
    /// Non-2xx status (`status` set) or transport failure (`status` empty).
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        reason: String,
    },
}

/// Per-target outcome of dispatching one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Destination name the target was chosen for.
    pub target: String,
    pub url: String,
    pub result: DeliveryResult,
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, DeliveryResult::Delivered { .. })
    }
}

/// Raw response from the delivery transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

// ── Housekeeping ────────────────────────────────────────────────────

/// What to do with a message once its dispatch has completed.
#[derive(Debug, Clone, Default)]
pub struct HousekeepingPlan {
    /// Label to apply, if any.
    pub label: Option<String>,
    /// Remove the message from the inbox after labeling.
    pub archive: bool,
}

/// Outcome of one housekeeping step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Done,
    Skipped { reason: String },
    Failed { reason: String },
}

impl StepOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Per-step results of housekeeping for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HousekeepingReport {
    pub mark_read: StepOutcome,
    pub label: StepOutcome,
    pub archive: StepOutcome,
}

// ── Collaborator traits ─────────────────────────────────────────────

/// Mailbox collaborator: search plus post-dispatch housekeeping.
///
/// Pure I/O. Routing, extraction, and delivery decisions live in the pipeline.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// Mailbox name for logging.
    fn name(&self) -> &str;

    /// Fetch the bounded batch of candidate messages, in server order.
    async fn fetch_unread(&self) -> Result<Vec<MailMessage>, MailboxError>;

    /// Mark read, label, and archive one message according to `plan`.
    ///
    /// Individual step failures are reported in the returned report; `Err`
    /// means no step could be attempted at all.
    async fn housekeep(
        &self,
        message: &MailMessage,
        plan: &HousekeepingPlan,
    ) -> Result<HousekeepingReport, MailboxError>;
}

/// Delivery transport: POST a JSON payload to an endpoint.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// Returns the status and body for any HTTP response, including non-2xx.
    /// `Err` is reserved for transport-level failures.
    async fn post_json(
        &self,
        url: &str,
        payload: &WebhookPayload,
    ) -> Result<TransportResponse, DeliveryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_key_displays_name() {
        let key = DestinationKey::new("Alois Lab");
        assert_eq!(key.to_string(), "Alois Lab");
        assert_eq!(key.as_str(), "Alois Lab");
    }

    #[test]
    fn destination_key_serializes_as_plain_string() {
        let json = serde_json::to_value(DestinationKey::from("Heads")).unwrap();
        assert_eq!(json, serde_json::json!("Heads"));
    }

    #[test]
    fn dispatch_outcome_success_flag() {
        let ok = DispatchOutcome {
            target: "General".into(),
            url: "https://hooks.example/general".into(),
            result: DeliveryResult::Delivered { status: 204 },
        };
        let failed = DispatchOutcome {
            result: DeliveryResult::Failed {
                status: Some(500),
                reason: "boom".into(),
            },
            ..ok.clone()
        };
        assert!(ok.is_success());
        assert!(!failed.is_success());
    }

    #[test]
    fn delivery_result_omits_missing_status() {
        let json = serde_json::to_value(DeliveryResult::Failed {
            status: None,
            reason: "connection refused".into(),
        })
        .unwrap();
        assert_eq!(json["result"], "failed");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn step_outcome_constructors() {
        assert_eq!(
            StepOutcome::skipped("no label"),
            StepOutcome::Skipped {
                reason: "no label".into()
            }
        );
        assert!(matches!(StepOutcome::failed("x"), StepOutcome::Failed { .. }));
    }
}
