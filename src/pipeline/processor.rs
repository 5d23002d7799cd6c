//! Relay processor: one pass over the mailbox.
//!
//! Flow per message:
//! 1. `ChannelResolver` and `LinkExtractor` run independently
//! 2. `NotificationBuilder` composes the notification
//! 3. `Dispatcher` fans it out (primary + default)
//! 4. Mailbox housekeeping runs regardless of delivery outcomes
//!
//! Continue-on-failure is explicit: every step yields a value recorded in
//! the `MessageReport`, and nothing in per-message processing returns `Err`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::MailboxError;
use crate::pipeline::builder::NotificationBuilder;
use crate::pipeline::dispatcher::Dispatcher;
use crate::pipeline::links::LinkExtractor;
use crate::pipeline::resolver::ChannelResolver;
use crate::pipeline::types::{
    DestinationKey, DispatchOutcome, HousekeepingPlan, HousekeepingReport, MailMessage, Mailbox,
    StepOutcome,
};

/// Housekeeping result for one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HousekeepingStatus {
    /// The mailbox session ran; see per-step outcomes.
    Completed(HousekeepingReport),
    /// No step could be attempted.
    Failed { reason: String },
}

impl HousekeepingStatus {
    /// True when the message was marked read.
    pub fn marked_read(&self) -> bool {
        matches!(
            self,
            Self::Completed(HousekeepingReport {
                mark_read: StepOutcome::Done,
                ..
            })
        )
    }
}

/// Everything that happened to one message.
#[derive(Debug, Clone, Serialize)]
pub struct MessageReport {
    pub message_id: String,
    pub subject: String,
    pub destination: Option<DestinationKey>,
    pub link: Option<String>,
    pub outcomes: Vec<DispatchOutcome>,
    pub housekeeping: HousekeepingStatus,
}

impl MessageReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }
}

/// Summary of one pass over the mailbox.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub pass_id: Uuid,
    pub fetched: usize,
    pub skipped_read: usize,
    pub messages: Vec<MessageReport>,
}

impl PassReport {
    pub fn delivered(&self) -> usize {
        self.messages.iter().map(MessageReport::delivered).sum()
    }

    pub fn failed(&self) -> usize {
        self.messages.iter().map(MessageReport::failed).sum()
    }
}

pub struct RelayProcessor {
    mailbox: Arc<dyn Mailbox>,
    resolver: ChannelResolver,
    extractor: Box<dyn LinkExtractor>,
    builder: NotificationBuilder,
    dispatcher: Dispatcher,
    housekeeping: HousekeepingPlan,
}

impl RelayProcessor {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        resolver: ChannelResolver,
        extractor: Box<dyn LinkExtractor>,
        builder: NotificationBuilder,
        dispatcher: Dispatcher,
        housekeeping: HousekeepingPlan,
    ) -> Self {
        Self {
            mailbox,
            resolver,
            extractor,
            builder,
            dispatcher,
            housekeeping,
        }
    }

    /// Fetch the batch and process every unread message in order.
    ///
    /// Only a failed fetch is an error; per-message failures are in the report.
    pub async fn run_pass(&self) -> Result<PassReport, MailboxError> {
        let pass_id = Uuid::new_v4();
        let span = info_span!("relay_pass", pass_id = %pass_id, mailbox = self.mailbox.name());

        async move {
            let batch = self.mailbox.fetch_unread().await?;
            info!(count = batch.len(), "Fetched candidate messages");

            let mut report = PassReport {
                pass_id,
                fetched: batch.len(),
                skipped_read: 0,
                messages: Vec::with_capacity(batch.len()),
            };

            for message in &batch {
                if !message.unread {
                    debug!(id = %message.id, "Skipping already-read message");
                    report.skipped_read += 1;
                    continue;
                }
                report.messages.push(self.process_message(message).await);
            }

            info!(
                processed = report.messages.len(),
                skipped = report.skipped_read,
                delivered = report.delivered(),
                failed = report.failed(),
                "Relay pass complete"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Route, extract, build, dispatch, then housekeep one message.
    pub async fn process_message(&self, message: &MailMessage) -> MessageReport {
        debug!(id = %message.id, subject = %message.subject, "Processing message");

        let destination = self.resolver.resolve(&message.subject);
        let link = self
            .extractor
            .extract(&message.html_body, &message.plain_body);
        debug!(
            id = %message.id,
            channel = destination.as_ref().map_or("none", DestinationKey::as_str),
            link = link.as_deref().unwrap_or("none"),
            "Classified message"
        );

        let notification = self
            .builder
            .build(message, destination.as_ref(), link.as_deref());
        let outcomes = self
            .dispatcher
            .dispatch(&notification, destination.as_ref())
            .await;

        let housekeeping = self.housekeep(message).await;

        MessageReport {
            message_id: message.id.clone(),
            subject: notification.title,
            destination,
            link,
            outcomes,
            housekeeping,
        }
    }

    async fn housekeep(&self, message: &MailMessage) -> HousekeepingStatus {
        match self.mailbox.housekeep(message, &self.housekeeping).await {
            Ok(report) => {
                for (step, outcome) in [
                    ("mark_read", &report.mark_read),
                    ("label", &report.label),
                    ("archive", &report.archive),
                ] {
                    match outcome {
                        StepOutcome::Done => {}
                        StepOutcome::Skipped { reason } => {
                            debug!(id = %message.id, step, reason = %reason, "Housekeeping step skipped");
                        }
                        StepOutcome::Failed { reason } => {
                            warn!(id = %message.id, step, reason = %reason, "Housekeeping step failed");
                        }
                    }
                }
                HousekeepingStatus::Completed(report)
            }
            Err(e) => {
                error!(id = %message.id, error = %e, "Housekeeping failed");
                HousekeepingStatus::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
