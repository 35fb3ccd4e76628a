//! Database implementations

pub mod integration_repository;
pub mod manager;

pub use integration_repository::SqliteIntegrationRepository;
pub use manager::DbManager;
