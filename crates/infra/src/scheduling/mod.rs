//! Scheduling infrastructure for the integration pipelines
//!
//! One [`IntegrationScheduler`] per enabled integration type fires its
//! pipeline's tick at a fixed period. Every scheduler:
//! - Has an explicit lifecycle (start/stop)
//! - Tracks the join handle of its loop
//! - Stops through a cancellation token
//! - Bounds every tick with a timeout

pub mod error;
pub mod integration_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use integration_scheduler::{IntegrationScheduler, IntegrationSchedulerConfig};
