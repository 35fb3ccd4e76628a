//! # HubRelay Application
//!
//! Composition root for the `hubrelay` binary: logging setup, service
//! wiring, the optional stdin feed and signal handling.

pub mod context;
pub mod feed;
pub mod logging;
pub mod shutdown;

pub use context::AppContext;
pub use feed::{feed_lines, FeedSummary};
