//! Normalized outcome of one call to the remote hub.

use serde::{Deserialize, Serialize};

use crate::constants::FAILED_DISPATCH_ID;

/// Success or failure of a dispatch, in the shape every resilience-wrapped
/// call returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// `>= 0` on success; negative values are a failure sentinel.
    pub id: i64,
    pub status_code: u16,
    /// Empty unless the dispatch failed.
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub details: Vec<String>,
}

impl DispatchResult {
    pub fn success(id: i64, status_code: u16) -> Self {
        Self { id, status_code, error: String::new(), details: Vec::new() }
    }

    pub fn failure(status_code: u16, error: impl Into<String>) -> Self {
        Self { id: FAILED_DISPATCH_ID, status_code, error: error.into(), details: Vec::new() }
    }

    #[must_use]
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }

    pub const fn is_success(&self) -> bool {
        self.id >= 0
    }
}
