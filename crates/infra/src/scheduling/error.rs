//! Scheduler error types

use std::time::Duration;

use hubrelay_domain::HubRelayError;
use thiserror::Error;
use tokio::task::JoinError;

use crate::errors::InfraError;

/// Errors raised by the tick schedulers and intake workers
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Already started
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// Not started, or already stopped
    #[error("Scheduler not running")]
    NotRunning,

    /// Rejected settings
    #[error("Invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    /// Operation timed out
    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Task join failed
    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

impl From<JoinError> for SchedulerError {
    fn from(err: JoinError) -> Self {
        Self::TaskJoinFailed(err.to_string())
    }
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let relay_err = match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                HubRelayError::InvalidInput(err.to_string())
            }
            SchedulerError::InvalidConfig(_) => HubRelayError::Config(err.to_string()),
            SchedulerError::Timeout { .. } | SchedulerError::TaskJoinFailed(_) => {
                HubRelayError::Internal(err.to_string())
            }
        };
        Self(relay_err)
    }
}

impl From<SchedulerError> for HubRelayError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
