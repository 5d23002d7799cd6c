//! Subject-code routing.
//!
//! A Huly subject starts with a short project code, optionally bracketed and
//! optionally followed by an issue number:
//! - `ALOIP Something`
//! - `ALOIL-7 Update`
//! - `[ALOIP] foo`
//!
//! The code is upper-cased and looked up in a `RoutingTable`. Unknown codes
//! and subjects without a code both resolve to `None`, which callers treat as
//! "default destination only".

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::ConfigError;
use crate::pipeline::types::DestinationKey;

/// Leading code: `[CODE]`, or bare `CODE` followed by a non-word character or
/// the end. Word characters are ASCII only, so `ALOIPé` still yields `ALOIP`.
static SUBJECT_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\[([A-Za-z0-9_]{4,6})\]|([A-Za-z0-9_]{4,6})(?:[^A-Za-z0-9_]|$))")
        .expect("subject code regex")
});

/// Codes are 4-6 ASCII alphanumerics.
static VALID_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{4,6}$").expect("routing code regex"));

/// Static code → destination table, read-only during a pass.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    codes: HashMap<String, DestinationKey>,
}

impl RoutingTable {
    /// Create an empty table (every subject resolves to `None`).
    pub fn empty() -> Self {
        Self::default()
    }

    /// The production code table.
    pub fn reference() -> Self {
        let mut table = Self::empty();
        for (code, name) in [
            ("ALOIP", "Alois Platform"),
            ("ALOIL", "Alois Lab"),
            ("HEADS", "Heads"),
            ("INTER", "Internal"),
            ("OUTRE", "Outreach"),
            ("SIMON", "Simons Lab"),
        ] {
            table.codes.insert(code.to_string(), DestinationKey::new(name));
        }
        table
    }

    /// Parse a `CODE=Destination,CODE=Destination` list.
    pub fn parse(codes: &str) -> Result<Self, ConfigError> {
        let mut table = Self::empty();
        for entry in codes.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((code, name)) = entry.split_once('=') else {
                return Err(ConfigError::InvalidValue {
                    key: "RELAY_ROUTING_CODES".into(),
                    message: format!("expected CODE=Destination, got {entry:?}"),
                });
            };
            table.insert(code.trim(), name.trim())?;
        }
        Ok(table)
    }

    /// Add or replace one code. The code is stored upper-cased.
    pub fn insert(&mut self, code: &str, destination: &str) -> Result<(), ConfigError> {
        if !VALID_CODE.is_match(code) {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_ROUTING_CODES".into(),
                message: format!("routing code {code:?} must be 4-6 letters or digits"),
            });
        }
        if destination.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_ROUTING_CODES".into(),
                message: format!("routing code {code} has an empty destination"),
            });
        }
        self.codes
            .insert(code.to_ascii_uppercase(), DestinationKey::new(destination));
        Ok(())
    }

    pub fn get(&self, code: &str) -> Option<&DestinationKey> {
        self.codes.get(code)
    }

    /// Distinct destination keys referenced by the table.
    pub fn destinations(&self) -> Vec<DestinationKey> {
        let mut keys: Vec<DestinationKey> = self.codes.values().cloned().collect();
        keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        keys.dedup();
        keys
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Resolves a subject line to a destination key.
#[derive(Debug, Clone)]
pub struct ChannelResolver {
    table: RoutingTable,
}

impl ChannelResolver {
    pub fn new(table: RoutingTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Resolve the leading routing code of `subject`.
    pub fn resolve(&self, subject: &str) -> Option<DestinationKey> {
        let code = leading_code(subject)?;
        let destination = self.table.get(&code).cloned();
        debug!(
            code = %code,
            destination = destination.as_ref().map_or("none", DestinationKey::as_str),
            "Resolved subject code"
        );
        destination
    }
}

/// Extract the upper-cased leading code, if the subject has one.
pub fn leading_code(subject: &str) -> Option<String> {
    let caps = SUBJECT_CODE.captures(subject.trim())?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_uppercase())
}
