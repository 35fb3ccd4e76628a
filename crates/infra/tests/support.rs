//! Shared helpers for `hubrelay-infra` integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use hubrelay_domain::{HubConfig, PartitionCredentials, ResilienceConfig};
use hubrelay_infra::database::DbManager;
use tempfile::TempDir;

pub const PARTITION: &str = "12345678000190";
pub const APP_TOKEN: &str = "app-token-test";

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a new temporary database with migrations applied.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("hubrelay-test.db");

        let manager = DbManager::new(&db_path, 4).expect("db manager should be created");
        manager.run_migrations().expect("migrations should apply");

        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }

    /// Execute a batch of SQL statements against the database.
    pub fn execute_batch(&self, sql: &str) {
        let conn = self
            .manager
            .get_connection()
            .expect("connection should be available for execute_batch");
        conn.execute_batch(sql).expect("SQL batch execution should succeed");
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Hub settings pointing at a mock server, with one partition configured.
pub fn hub_config(url: &str) -> HubConfig {
    HubConfig {
        url: url.to_string(),
        app_token: APP_TOKEN.to_string(),
        request_timeout_secs: 2,
        partitions: BTreeMap::from([(PARTITION.to_string(), credentials())]),
        ..HubConfig::default()
    }
}

pub fn credentials() -> PartitionCredentials {
    PartitionCredentials { api_key: "key-1".into(), secret_key: "secret-1".into() }
}

/// Resilience settings with 1 ms retry waits.
pub fn fast_resilience(max_attempts: u32) -> ResilienceConfig {
    let mut settings = ResilienceConfig::default();
    settings.retry.max_attempts = max_attempts;
    settings.retry.wait_duration_ms = 1;
    settings
}
