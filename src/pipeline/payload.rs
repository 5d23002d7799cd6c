//! Webhook wire payload (Discord-compatible embed + link button).

use serde::{Deserialize, Serialize};

use crate::pipeline::types::Notification;

/// Component type code for an action row.
const COMPONENT_ACTION_ROW: u8 = 1;
/// Component type code for a button.
const COMPONENT_BUTTON: u8 = 2;
/// Button style code for a link button.
const BUTTON_STYLE_LINK: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub username: String,
    pub embeds: Vec<Embed>,
    pub components: Vec<ActionRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub description: String,
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRow {
    #[serde(rename = "type")]
    pub kind: u8,
    pub components: Vec<LinkButton>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkButton {
    #[serde(rename = "type")]
    pub kind: u8,
    pub style: u8,
    pub label: String,
    pub url: String,
}

impl WebhookPayload {
    /// Serialize `notification` under the display identity `username`.
    pub fn from_notification(notification: &Notification, username: impl Into<String>) -> Self {
        let embed = Embed {
            title: notification.title.clone(),
            url: notification.link.clone(),
            description: notification.snippet.clone(),
            fields: notification
                .fields
                .iter()
                .map(|f| EmbedField {
                    name: f.name.clone(),
                    value: f.value.clone(),
                    inline: f.inline,
                })
                .collect(),
        };

        let components = notification
            .action
            .iter()
            .map(|action| ActionRow {
                kind: COMPONENT_ACTION_ROW,
                components: vec![LinkButton {
                    kind: COMPONENT_BUTTON,
                    style: BUTTON_STYLE_LINK,
                    label: action.label.clone(),
                    url: action.url.clone(),
                }],
            })
            .collect();

        Self {
            username: username.into(),
            embeds: vec![embed],
            components,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::{ActionButton, NotificationField};

    fn notification(link: Option<&str>) -> Notification {
        Notification {
            title: "ALOIP-42 Fix login".into(),
            link: link.map(String::from),
            snippet: "Someone commented".into(),
            fields: vec![
                NotificationField::new("From", "noreply@huly.app", true),
                NotificationField::new("Date", "2026-10-14T09:30:00.000Z", true),
                NotificationField::new("Routed", "Alois Platform", false),
            ],
            action: link.map(|url| ActionButton {
                label: "View in Huly".into(),
                url: url.into(),
            }),
        }
    }

    #[test]
    fn payload_with_link_matches_wire_shape() {
        let payload = WebhookPayload::from_notification(
            &notification(Some("https://huly.app/i/1")),
            "Huly Bot — Alois Platform",
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "username": "Huly Bot — Alois Platform",
                "embeds": [{
                    "title": "ALOIP-42 Fix login",
                    "url": "https://huly.app/i/1",
                    "description": "Someone commented",
                    "fields": [
                        { "name": "From", "value": "noreply@huly.app", "inline": true },
                        { "name": "Date", "value": "2026-10-14T09:30:00.000Z", "inline": true },
                        { "name": "Routed", "value": "Alois Platform", "inline": false }
                    ]
                }],
                "components": [{
                    "type": 1,
                    "components": [{
                        "type": 2,
                        "style": 5,
                        "label": "View in Huly",
                        "url": "https://huly.app/i/1"
                    }]
                }]
            })
        );
    }

    #[test]
    fn payload_without_link_has_no_url_and_no_components() {
        let payload = WebhookPayload::from_notification(&notification(None), "Huly Bot — unknown");
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["embeds"][0].get("url").is_none());
        assert_eq!(json["components"], serde_json::json!([]));
        assert_eq!(json["embeds"].as_array().unwrap().len(), 1);
    }
}
