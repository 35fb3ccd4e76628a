//! # HubRelay Domain
//!
//! Business domain types for the HubRelay integration bridge.
//!
//! This crate contains:
//! - Integration records, statuses and integration types
//! - Dispatch results and the hub's request/response shapes
//! - Configuration structures
//! - Domain error types and Result definitions
//!
//! ## Architecture
//! - No dependencies on other HubRelay crates
//! - Pure data structures plus their invariants

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
