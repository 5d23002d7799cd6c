//! Mailbox and webhook I/O behind the pipeline's trait seams.

pub mod imap;
pub mod webhook;

pub use imap::ImapMailbox;
pub use webhook::ReqwestTransport;
