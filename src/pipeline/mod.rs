//! Classification-and-relay pipeline.
//!
//! Every unread message flows through:
//! 1. `Mailbox::fetch_unread()`: mailbox I/O
//! 2. `ChannelResolver::resolve()` + `LinkExtractor::extract()`: independent, pure
//! 3. `NotificationBuilder::build()`: pure
//! 4. `Dispatcher::dispatch()`: one attempt per target, primary then default
//! 5. `Mailbox::housekeep()`: mark read, label, archive
//!
//! **The default destination receives every processed message.**

pub mod builder;
pub mod dispatcher;
pub mod links;
pub mod payload;
pub mod processor;
pub mod relay_loop;
pub mod resolver;
pub mod types;

pub use builder::NotificationBuilder;
pub use dispatcher::{DestinationTable, Dispatcher};
pub use links::{LinkExtractor, PatternLinkExtractor};
pub use processor::{PassReport, RelayProcessor};
pub use resolver::{ChannelResolver, RoutingTable};
