//! Huly Relay — routes Huly notification mail to chat webhooks.

pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
