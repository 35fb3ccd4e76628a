//! Configuration loading and management
//!
//! This module provides utilities for loading the bridge configuration from
//! files and environment variables.

pub mod loader;

// Re-export commonly used items
pub use loader::{load, load_from_file, load_with_env, probe_config_paths};
