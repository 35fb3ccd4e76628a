//! # HubRelay Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - SQLite persistence for integration records (rusqlite + r2d2)
//! - The HTTP hub client (reqwest)
//! - The in-process token cache (moka)
//! - Configuration loading
//! - Per-type tick schedulers and queue intake workers
//!
//! ## Architecture
//! - Implements traits defined in `hubrelay-core`
//! - Depends on `hubrelay-domain` and `hubrelay-core`
//! - Contains all "impure" code (I/O, timers, network)

pub mod cache;
pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod hub;
pub mod queue;
pub mod scheduling;

// Re-export commonly used items
pub use cache::MokaTokenCache;
pub use database::{DbManager, SqliteIntegrationRepository};
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
pub use hub::HttpHubClient;
pub use queue::{ChannelMessageSource, IntakeWorker, QueueSender};
pub use scheduling::{IntegrationScheduler, SchedulerError, SchedulerResult};
