//! IMAP mailbox — search, fetch, and post-dispatch housekeeping.
//!
//! Raw IMAP4rev1 over implicit TLS (rustls). All I/O is blocking and runs in
//! `spawn_blocking`. Each operation opens its own session:
//! - `fetch_unread`: LOGIN → SELECT → UID SEARCH → UID FETCH (BODY.PEEK) → LOGOUT
//! - `housekeep`: LOGIN → SELECT → mark \Seen → label → archive → LOGOUT
//!
//! Labels use Gmail's `X-GM-LABELS` when the server advertises `X-GM-EXT-1`,
//! and `UID COPY` to a folder of the same name otherwise.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use mail_parser::{MessageParser, PartType};
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use crate::config::ImapConfig;
use crate::error::MailboxError;
use crate::pipeline::types::{
    HousekeepingPlan, HousekeepingReport, MailMessage, Mailbox, StepOutcome,
};

/// Socket read/write timeout.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

const GMAIL_CAPABILITY: &str = "X-GM-EXT-1";
const MOVE_CAPABILITY: &str = "MOVE";

/// `Mailbox` backed by an IMAP server.
#[derive(Debug, Clone)]
pub struct ImapMailbox {
    config: ImapConfig,
}

impl ImapMailbox {
    pub fn new(config: ImapConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    fn name(&self) -> &str {
        "imap"
    }

    async fn fetch_unread(&self) -> Result<Vec<MailMessage>, MailboxError> {
        let cfg = self.config.clone();
        tokio::task::spawn_blocking(move || fetch_unread_blocking(&cfg))
            .await
            .map_err(|e| MailboxError::TaskFailed(e.to_string()))?
    }

    async fn housekeep(
        &self,
        message: &MailMessage,
        plan: &HousekeepingPlan,
    ) -> Result<HousekeepingReport, MailboxError> {
        let cfg = self.config.clone();
        let uid = message.id.clone();
        let plan = plan.clone();
        tokio::task::spawn_blocking(move || housekeep_blocking(&cfg, &uid, &plan))
            .await
            .map_err(|e| MailboxError::TaskFailed(e.to_string()))?
    }
}

// ── Blocking operations ─────────────────────────────────────────────

fn fetch_unread_blocking(config: &ImapConfig) -> Result<Vec<MailMessage>, MailboxError> {
    let mut session = ImapSession::open(config)?;

    let since = Utc::now().date_naive() - chrono::Duration::days(i64::from(config.lookback_days));
    let search = session.command(&search_command(&config.sender, since))?;
    let mut uids = parse_search(&search.lines);
    uids.truncate(config.max_messages);
    debug!(count = uids.len(), sender = %config.sender, "IMAP search complete");

    let messages = fetch_each(&uids, |uid| {
        session.command(&format!("UID FETCH {uid} (FLAGS BODY.PEEK[])"))
    })?;

    session.logout();
    Ok(messages)
}

/// Fetch and parse every UID in order.
///
/// A rejected command (e.g. the message was expunged after SEARCH) skips that
/// UID; connection and protocol errors abort the batch.
fn fetch_each<F>(uids: &[String], mut fetch: F) -> Result<Vec<MailMessage>, MailboxError>
where
    F: FnMut(&str) -> Result<Response, MailboxError>,
{
    let mut messages = Vec::with_capacity(uids.len());
    for uid in uids {
        let resp = match fetch(uid) {
            Ok(resp) => resp,
            Err(MailboxError::Command { command, reason }) => {
                warn!(uid = %uid, command = %command, reason = %reason, "FETCH rejected, skipping message");
                continue;
            }
            Err(e) => return Err(e),
        };
        let Some(raw) = resp.literals.first() else {
            warn!(uid = %uid, "FETCH returned no message body");
            continue;
        };
        let unread = !resp.lines.iter().any(|l| has_seen_flag(l));
        match parse_message(uid, raw, unread) {
            Some(msg) => messages.push(msg),
            None => warn!(uid = %uid, "Failed to parse message"),
        }
    }
    Ok(messages)
}

fn housekeep_blocking(
    config: &ImapConfig,
    uid: &str,
    plan: &HousekeepingPlan,
) -> Result<HousekeepingReport, MailboxError> {
    let mut session = ImapSession::open(config)?;

    let mark_read = step(session.command(&format!("UID STORE {uid} +FLAGS.SILENT (\\Seen)")));

    let label = match &plan.label {
        Some(label) => session.apply_label(uid, label),
        None => StepOutcome::skipped("no label configured"),
    };

    let archive = if plan.archive {
        session.archive(uid, &config.archive_folder)
    } else {
        StepOutcome::skipped("archive disabled")
    };

    session.logout();
    Ok(HousekeepingReport {
        mark_read,
        label,
        archive,
    })
}

fn step(result: Result<Response, MailboxError>) -> StepOutcome {
    match result {
        Ok(_) => StepOutcome::Done,
        Err(e) => StepOutcome::failed(e.to_string()),
    }
}

// ── Session ─────────────────────────────────────────────────────────

type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// Untagged lines and literals collected up to the tagged OK.
#[derive(Debug, Default)]
struct Response {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

struct ImapSession {
    stream: BufReader<TlsStream>,
    next_tag: u32,
    capabilities: Vec<String>,
}

impl ImapSession {
    /// Connect, authenticate, load capabilities, and select the folder.
    fn open(config: &ImapConfig) -> Result<Self, MailboxError> {
        let mut session = Self::connect(config)?;
        session.login(config)?;
        session.load_capabilities()?;
        session.command(&format!("SELECT {}", quote(&config.folder)))?;
        Ok(session)
    }

    fn connect(config: &ImapConfig) -> Result<Self, MailboxError> {
        let connect_err = |reason: String| MailboxError::Connect {
            host: config.host.clone(),
            reason,
        };

        let tcp = TcpStream::connect((config.host.as_str(), config.port))
            .map_err(|e| connect_err(e.to_string()))?;
        tcp.set_read_timeout(Some(IO_TIMEOUT))?;
        tcp.set_write_timeout(Some(IO_TIMEOUT))?;

        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = ServerName::try_from(config.host.clone())
            .map_err(|e| MailboxError::Tls(e.to_string()))?;
        let conn = ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::Tls(e.to_string()))?;

        let mut session = Self {
            stream: BufReader::new(StreamOwned::new(conn, tcp)),
            next_tag: 1,
            capabilities: Vec::new(),
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(MailboxError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.trim_end()
            )));
        }
        Ok(session)
    }

    fn login(&mut self, config: &ImapConfig) -> Result<(), MailboxError> {
        let cmd = format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        );
        match self.command(&cmd) {
            Ok(_) => Ok(()),
            Err(MailboxError::Command { .. }) => Err(MailboxError::AuthFailed {
                host: config.host.clone(),
            }),
            Err(e) => Err(e),
        }
    }

    fn load_capabilities(&mut self) -> Result<(), MailboxError> {
        let resp = self.command("CAPABILITY")?;
        self.capabilities = parse_capabilities(&resp.lines);
        Ok(())
    }

    fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.eq_ignore_ascii_case(name))
    }

    fn is_gmail(&self) -> bool {
        self.has_capability(GMAIL_CAPABILITY)
    }

    fn apply_label(&mut self, uid: &str, label: &str) -> StepOutcome {
        let exists = match self.command(&format!("LIST \"\" {}", quote(label))) {
            Ok(resp) => resp.lines.iter().any(|l| l.starts_with("* LIST")),
            Err(e) => return StepOutcome::failed(e.to_string()),
        };
        if !exists {
            warn!(label = %label, "Label not found — skipping label");
            return StepOutcome::skipped(format!("label {label:?} not found"));
        }

        let cmd = if self.is_gmail() {
            format!("UID STORE {uid} +X-GM-LABELS ({})", quote(label))
        } else {
            format!("UID COPY {uid} {}", quote(label))
        };
        step(self.command(&cmd))
    }

    fn archive(&mut self, uid: &str, archive_folder: &str) -> StepOutcome {
        if self.is_gmail() {
            step(self.command(&format!("UID STORE {uid} -X-GM-LABELS (\\Inbox)")))
        } else if self.has_capability(MOVE_CAPABILITY) {
            step(self.command(&format!("UID MOVE {uid} {}", quote(archive_folder))))
        } else {
            StepOutcome::skipped("server supports neither Gmail labels nor MOVE")
        }
    }

    fn logout(mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!(error = %e, "IMAP logout failed");
        }
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        if self.stream.read_until(b'\n', &mut buf)? == 0 {
            return Err(MailboxError::Protocol("connection closed".into()));
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Send one tagged command and collect its response.
    fn command(&mut self, cmd: &str) -> Result<Response, MailboxError> {
        let tag = format!("A{:04}", self.next_tag);
        self.next_tag += 1;

        let stream = self.stream.get_mut();
        stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        stream.flush()?;

        let prefix = format!("{tag} ");
        let mut response = Response::default();
        loop {
            let line = self.read_line()?;

            if let Some(len) = literal_len(&line) {
                let mut literal = vec![0u8; len];
                self.stream.read_exact(&mut literal)?;
                response.literals.push(literal);
                response.lines.push(line);
                continue;
            }

            if let Some(status) = line.strip_prefix(&prefix) {
                let status = status.trim_end();
                if status.starts_with("OK") {
                    return Ok(response);
                }
                return Err(MailboxError::Command {
                    command: command_name(cmd),
                    reason: status.to_string(),
                });
            }

            response.lines.push(line);
        }
    }
}

// ── Protocol helpers (public for testing) ───────────────────────────

/// `UID SEARCH` for unread mail from (or replying to) `sender` since `since`.
pub fn search_command(sender: &str, since: NaiveDate) -> String {
    let sender = quote(sender);
    format!(
        "UID SEARCH UNSEEN SINCE {} OR FROM {sender} HEADER REPLY-TO {sender}",
        since.format("%d-%b-%Y")
    )
}

/// UIDs from `* SEARCH` lines, in server order.
pub fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|l| l.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

/// Capability atoms from `* CAPABILITY` lines.
pub fn parse_capabilities(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|l| l.strip_prefix("* CAPABILITY"))
        .flat_map(|rest| rest.split_whitespace().map(str::to_string))
        .collect()
}

/// Length of a trailing `{N}` literal marker, if present.
pub fn literal_len(line: &str) -> Option<usize> {
    let line = line.trim_end();
    let open = line.strip_suffix('}')?.rfind('{')?;
    line[open + 1..line.len() - 1].parse().ok()
}

/// Whether a FETCH line carries `\Seen` in its FLAGS list.
pub fn has_seen_flag(line: &str) -> bool {
    let upper = line.to_ascii_uppercase();
    let Some(start) = upper.find("FLAGS (") else {
        return false;
    };
    let flags = &upper[start + 7..];
    let end = flags.find(')').unwrap_or(flags.len());
    flags[..end].split_whitespace().any(|f| f == "\\SEEN")
}

/// IMAP quoted string.
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Command verb for error messages; never includes arguments.
fn command_name(cmd: &str) -> String {
    let mut words = cmd.split_whitespace();
    match (words.next(), words.next()) {
        (Some(uid), Some(verb)) if uid.eq_ignore_ascii_case("UID") => format!("UID {verb}"),
        (Some(verb), _) => verb.to_string(),
        _ => String::new(),
    }
}

/// Parse a raw RFC 822 message into a `MailMessage`.
pub fn parse_message(uid: &str, raw: &[u8], unread: bool) -> Option<MailMessage> {
    let parsed = MessageParser::default().parse(raw)?;

    let from = parsed
        .from()
        .and_then(|addr| addr.first())
        .map(|a| match (a.name(), a.address()) {
            (Some(name), Some(address)) => format!("{name} <{address}>"),
            (None, Some(address)) => address.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => "unknown".to_string(),
        })
        .unwrap_or_else(|| "unknown".to_string());

    let date = parsed
        .date()
        .and_then(|d| chrono::DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(Utc::now);

    let plain_body = parsed
        .body_text(0)
        .map(|t| t.into_owned())
        .unwrap_or_default();

    // Only a real text/html part counts; mail-parser would otherwise render
    // the text part as HTML.
    let html_body = parsed
        .html_part(0)
        .and_then(|part| match &part.body {
            PartType::Html(html) => Some(html.to_string()),
            _ => None,
        })
        .unwrap_or_default();

    info!(uid = %uid, subject = parsed.subject().unwrap_or(""), "Fetched message");

    Some(MailMessage {
        id: uid.to_string(),
        from,
        subject: parsed.subject().unwrap_or_default().to_string(),
        date,
        plain_body,
        html_body,
        unread,
    })
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn search_command_filters_sender_and_window() {
        let since = NaiveDate::from_ymd_opt(2026, 10, 2).unwrap();
        assert_eq!(
            search_command("noreply@huly.app", since),
            "UID SEARCH UNSEEN SINCE 02-Oct-2026 OR FROM \"noreply@huly.app\" HEADER REPLY-TO \"noreply@huly.app\""
        );
    }

    #[test]
    fn parse_search_keeps_server_order() {
        let resp = lines(&["* SEARCH 12 7 30\r\n"]);
        assert_eq!(parse_search(&resp), vec!["12", "7", "30"]);
    }

    #[test]
    fn parse_search_empty_result() {
        assert!(parse_search(&lines(&["* SEARCH\r\n"])).is_empty());
        assert!(parse_search(&[]).is_empty());
    }

    #[test]
    fn parse_capabilities_reads_atoms() {
        let caps = parse_capabilities(&lines(&["* CAPABILITY IMAP4rev1 X-GM-EXT-1 MOVE IDLE\r\n"]));
        assert!(caps.iter().any(|c| c == "X-GM-EXT-1"));
        assert!(caps.iter().any(|c| c == "MOVE"));
        assert!(!caps.iter().any(|c| c == "CAPABILITY"));
    }

    #[test]
    fn literal_len_parses_marker() {
        assert_eq!(literal_len("* 1 FETCH (UID 4 BODY[] {342}\r\n"), Some(342));
        assert_eq!(literal_len("* 1 FETCH (UID 4 FLAGS ())\r\n"), None);
        assert_eq!(literal_len("{abc}\r\n"), None);
    }

    #[test]
    fn seen_flag_detection() {
        assert!(has_seen_flag("* 1 FETCH (UID 4 FLAGS (\\Seen \\Flagged) BODY[] {10}"));
        assert!(!has_seen_flag("* 1 FETCH (UID 4 FLAGS (\\Flagged) BODY[] {10}"));
        assert!(!has_seen_flag("* 1 FETCH (UID 4 FLAGS () BODY[] {10}"));
        assert!(!has_seen_flag(")\r\n"));
    }

    #[test]
    fn quote_escapes_specials() {
        assert_eq!(quote("Huly"), "\"Huly\"");
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn command_name_hides_arguments() {
        assert_eq!(command_name("LOGIN \"u\" \"secret\""), "LOGIN");
        assert_eq!(command_name("UID FETCH 4 (BODY.PEEK[])"), "UID FETCH");
        assert_eq!(command_name(""), "");
    }

    const MULTIPART: &str = "From: Huly <noreply@huly.app>\r\n\
Subject: ALOIP-42 Login broken\r\n\
Date: Wed, 14 Oct 2026 09:30:00 +0000\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/alternative; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Alice commented on ALOIP-42\r\n\
--b1\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Alice commented</p><a href=\"https://huly.app/i/42\">View in Huly</a>\r\n\
--b1--\r\n";

    #[test]
    fn parse_multipart_message() {
        let msg = parse_message("42", MULTIPART.as_bytes(), true).unwrap();
        assert_eq!(msg.id, "42");
        assert_eq!(msg.from, "Huly <noreply@huly.app>");
        assert_eq!(msg.subject, "ALOIP-42 Login broken");
        assert_eq!(msg.date.to_rfc3339(), "2026-10-14T09:30:00+00:00");
        assert!(msg.plain_body.contains("Alice commented on ALOIP-42"));
        assert!(msg.html_body.contains("https://huly.app/i/42"));
        assert!(msg.unread);
    }

    #[test]
    fn parse_plain_only_message_has_no_html() {
        let raw = "From: noreply@huly.app\r\nSubject: hello\r\n\r\nsee https://huly.app/x\r\n";
        let msg = parse_message("7", raw.as_bytes(), false).unwrap();
        assert_eq!(msg.from, "noreply@huly.app");
        assert!(msg.html_body.is_empty());
        assert!(msg.plain_body.contains("https://huly.app/x"));
        assert!(!msg.unread);
    }

    #[test]
    fn parse_message_without_subject() {
        let raw = "From: noreply@huly.app\r\n\r\nbody\r\n";
        let msg = parse_message("8", raw.as_bytes(), true).unwrap();
        assert_eq!(msg.subject, "");
    }

    fn fetched(raw: &str) -> Response {
        Response {
            lines: vec!["* 1 FETCH (UID 1 FLAGS () BODY[] {10}\r\n".into(), ")\r\n".into()],
            literals: vec![raw.as_bytes().to_vec()],
        }
    }

    fn uids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn rejected_fetch_skips_only_that_uid() {
        let raw = "From: noreply@huly.app\r\nSubject: HEADS-1 sync\r\n\r\nbody\r\n";
        let messages = fetch_each(&uids(&["1", "2", "3"]), |uid| match uid {
            "2" => Err(MailboxError::Command {
                command: "UID FETCH".into(),
                reason: "NO message expunged".into(),
            }),
            _ => Ok(fetched(raw)),
        })
        .unwrap();

        let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert!(messages.iter().all(|m| m.unread));
    }

    #[test]
    fn protocol_error_aborts_the_batch() {
        let mut calls = 0;
        let err = fetch_each(&uids(&["1", "2"]), |_| {
            calls += 1;
            Err(MailboxError::Protocol("connection closed".into()))
        })
        .unwrap_err();
        assert!(matches!(err, MailboxError::Protocol(_)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn fetch_without_literal_is_skipped() {
        let messages = fetch_each(&uids(&["5"]), |_| Ok(Response::default())).unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn mailbox_name() {
        let cfg = ImapConfig::from_vars(|k| match k {
            "IMAP_USERNAME" => Some("u".into()),
            "IMAP_PASSWORD" => Some("p".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(ImapMailbox::new(cfg).name(), "imap");
    }
}
