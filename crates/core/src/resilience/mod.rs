//! Compound fault tolerance for outbound hub calls.

mod executor;

pub use executor::{HubRetryPolicy, ResilientExecutor, PRIMARY_BREAKER, STABILITY_BREAKER};
