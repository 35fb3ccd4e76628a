//! # HubRelay Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces (traits) for the record store, token cache, hub client
//!   and message source
//! - Failure classification for outbound hub calls
//! - The resilient executor (retry + two-stage circuit breaker)
//! - Token resolution, batch dispatch and message intake
//!
//! ## Architecture Principles
//! - Only depends on `hubrelay-common` and `hubrelay-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod auth;
pub mod batch;
pub mod hub;
pub mod intake;
pub mod pipeline;
pub mod resilience;

// Re-export specific items to avoid ambiguity
pub use auth::TokenManager;
pub use batch::ports::{BatchDispatch, RecordStore};
pub use batch::{BatchProcessor, PayloadDecoder, TickReport};
pub use hub::ports::{HubClient, TokenCache};
pub use hub::{classify, FailureKind, HubError, HubService};
pub use intake::ports::{MessageSource, QueueMessage};
pub use intake::IntakeHandler;
pub use pipeline::{IntegrationPipeline, Pipeline};
pub use resilience::{HubRetryPolicy, ResilientExecutor};
