//! Outbound hub integration
//!
//! Ports for the hub client and token cache, the classified [`HubError`], and
//! the [`HubService`] that sends batches under the resilient executor.

mod error;
pub mod ports;
mod service;

pub use error::{classify, FailureKind, HubError};
pub use ports::{HubClient, TokenCache};
pub use service::HubService;
