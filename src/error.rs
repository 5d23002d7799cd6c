//! Error types for the Huly relay.
//!
//! Resolution and extraction misses are not errors (they are `None`), and
//! per-target delivery failures are recorded as `DeliveryResult` values.
//! What remains here is configuration, mailbox I/O, and transport failures.

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mailbox (IMAP) errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Authentication failed for {host}")]
    AuthFailed { host: String },

    #[error("IMAP command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mailbox task failed: {0}")]
    TaskFailed(String),
}

/// Outbound webhook delivery errors.
///
/// A non-2xx response is not a `DeliveryError`; the transport returns it as a
/// normal response and the dispatcher records it.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Transport error posting to {url}: {reason}")]
    Transport { url: String, reason: String },

    #[error("Delivery client misconfigured: {0}")]
    Configuration(String),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
