//! Builds the notification for one message. Pure, no I/O.

use chrono::SecondsFormat;

use crate::pipeline::types::{
    ActionButton, DestinationKey, MailMessage, Notification, NotificationField,
};

/// Maximum snippet length in characters.
pub const DEFAULT_SNIPPET_LIMIT: usize = 900;

pub const NO_SUBJECT: &str = "(no subject)";
pub const NO_PREVIEW: &str = "(no preview)";
pub const UNROUTED: &str = "—";
pub const ACTION_LABEL: &str = "View in Huly";

#[derive(Debug, Clone)]
pub struct NotificationBuilder {
    snippet_limit: usize,
}

impl Default for NotificationBuilder {
    fn default() -> Self {
        Self {
            snippet_limit: DEFAULT_SNIPPET_LIMIT,
        }
    }
}

impl NotificationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snippet_limit(mut self, limit: usize) -> Self {
        self.snippet_limit = limit;
        self
    }

    pub fn build(
        &self,
        message: &MailMessage,
        destination: Option<&DestinationKey>,
        link: Option<&str>,
    ) -> Notification {
        let title = if message.subject.is_empty() {
            NO_SUBJECT.to_string()
        } else {
            message.subject.clone()
        };

        let fields = vec![
            NotificationField::new("From", message.from.as_str(), true),
            NotificationField::new(
                "Date",
                message.date.to_rfc3339_opts(SecondsFormat::Millis, true),
                true,
            ),
            NotificationField::new(
                "Routed",
                destination.map_or(UNROUTED, DestinationKey::as_str),
                false,
            ),
        ];

        Notification {
            title,
            link: link.map(String::from),
            snippet: snippet(&message.plain_body, self.snippet_limit),
            fields,
            action: link.map(|url| ActionButton {
                label: ACTION_LABEL.to_string(),
                url: url.to_string(),
            }),
        }
    }
}

/// One space per line break, trimmed, placeholder if empty, cut to `limit` chars.
pub fn snippet(plain: &str, limit: usize) -> String {
    let flattened = plain.replace("\r\n", " ").replace('\n', " ");
    let trimmed = flattened.trim();
    let text = if trimmed.is_empty() { NO_PREVIEW } else { trimmed };
    text.chars().take(limit).collect()
}
