//! Partition-scoped hub credentials

mod token_manager;

pub use token_manager::TokenManager;
