//! Configuration types, built from environment variables.
//!
//! Every `from_env` has a `from_vars` twin taking a lookup closure so the
//! tables can be built from synthetic values in tests.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::pipeline::dispatcher::DestinationTable;
use crate::pipeline::relay_loop::DEFAULT_POLL_INTERVAL_SECS;
use crate::pipeline::resolver::RoutingTable;
use crate::pipeline::types::{DestinationKey, HousekeepingPlan};

pub const DEFAULT_BOT_NAME: &str = "Huly Bot";
pub const DEFAULT_SENDER: &str = "noreply@huly.app";
pub const DEFAULT_LABEL: &str = "Huly";

/// Environment variable holding the endpoint for `key`.
///
/// `Alois Platform` → `WEBHOOK_ALOIS_PLATFORM`.
pub fn webhook_env_var(key: &DestinationKey) -> String {
    let suffix: String = key
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("WEBHOOK_{suffix}")
}

// ── IMAP ────────────────────────────────────────────────────────────

/// Mailbox connection and search settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Folder searched for new notifications.
    pub folder: String,
    /// Only messages from (or replying to) this address are fetched.
    pub sender: String,
    /// Only messages newer than this many days are fetched.
    pub lookback_days: u32,
    /// Upper bound on messages fetched per pass.
    pub max_messages: usize,
    /// MOVE target when archiving on servers without Gmail labels.
    pub archive_folder: String,
}

impl ImapConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = required(&get, "IMAP_USERNAME")?;
        let password = required(&get, "IMAP_PASSWORD")?;

        Ok(Self {
            host: get("IMAP_HOST").unwrap_or_else(|| "imap.gmail.com".to_string()),
            port: parsed(&get, "IMAP_PORT")?.unwrap_or(993),
            username,
            password: SecretString::from(password),
            folder: get("IMAP_FOLDER").unwrap_or_else(|| "INBOX".to_string()),
            sender: get("RELAY_SENDER").unwrap_or_else(|| DEFAULT_SENDER.to_string()),
            lookback_days: parsed(&get, "RELAY_LOOKBACK_DAYS")?.unwrap_or(2),
            max_messages: parsed(&get, "RELAY_MAX_MESSAGES")?.unwrap_or(50),
            archive_folder: get("RELAY_ARCHIVE_FOLDER").unwrap_or_else(|| "Archive".to_string()),
        })
    }
}

// ── Webhooks ────────────────────────────────────────────────────────

/// Destination endpoints and delivery identity.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub destinations: DestinationTable,
    pub bot_name: String,
    /// Optional total request timeout; `None` keeps the transport default.
    pub timeout: Option<Duration>,
}

impl WebhookConfig {
    /// Read `WEBHOOK_GENERAL` plus one `WEBHOOK_<KEY>` per destination in `routing`.
    pub fn from_vars<F>(get: F, routing: &RoutingTable) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let general = required(&get, "WEBHOOK_GENERAL")?;
        let mut destinations = DestinationTable::new(general);

        for key in routing.destinations() {
            if let Some(url) = get(&webhook_env_var(&key)) {
                destinations.insert(key, url);
            }
        }

        Ok(Self {
            destinations,
            bot_name: get("RELAY_BOT_NAME").unwrap_or_else(|| DEFAULT_BOT_NAME.to_string()),
            timeout: parsed::<u64, _>(&get, "RELAY_HTTP_TIMEOUT_SECS")?.map(Duration::from_secs),
        })
    }
}

// ── Relay ───────────────────────────────────────────────────────────

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub imap: ImapConfig,
    pub webhooks: WebhookConfig,
    pub routing: RoutingTable,
    pub housekeeping: HousekeepingPlan,
    pub poll_interval: Duration,
    /// Run a single pass and exit.
    pub run_once: bool,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let routing = match get("RELAY_ROUTING_CODES") {
            Some(codes) if !codes.trim().is_empty() => RoutingTable::parse(&codes)?,
            _ => RoutingTable::reference(),
        };

        let webhooks = WebhookConfig::from_vars(&get, &routing)?;
        let imap = ImapConfig::from_vars(&get)?;

        let label = get("RELAY_LABEL")
            .unwrap_or_else(|| DEFAULT_LABEL.to_string())
            .trim()
            .to_string();
        let housekeeping = HousekeepingPlan {
            label: (!label.is_empty()).then_some(label),
            archive: flag(&get, "RELAY_ARCHIVE_AFTER_SEND")?.unwrap_or(true),
        };

        let interval_secs: u64 =
            parsed(&get, "RELAY_POLL_INTERVAL_SECS")?.unwrap_or(DEFAULT_POLL_INTERVAL_SECS);
        if interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_POLL_INTERVAL_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            imap,
            webhooks,
            routing,
            housekeeping,
            poll_interval: Duration::from_secs(interval_secs),
            run_once: flag(&get, "RELAY_RUN_ONCE")?.unwrap_or(false),
        })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn required<F>(get: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parsed<T, F>(get: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

fn flag<F>(get: &F, key: &str) -> Result<Option<bool>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}
