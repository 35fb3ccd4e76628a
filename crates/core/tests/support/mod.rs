//! Shared test helpers for `hubrelay-core` integration tests.
//!
//! In-memory fakes for every core port so the batch, token and dispatch
//! tests can focus on behaviour instead of plumbing.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use hubrelay_core::{BatchDispatch, HubClient, HubError, RecordStore, TokenCache};
use hubrelay_domain::{
    BearerToken, DispatchResult, HubBatch, HubRelayError, IntegrationRecord, IntegrationStatus,
    IntegrationType, PartitionCredentials, ResilienceConfig, Result as DomainResult,
};

/// Resilience settings with 1 ms retry waits.
pub fn fast_resilience(max_attempts: u32) -> ResilienceConfig {
    let mut settings = ResilienceConfig::default();
    settings.retry.max_attempts = max_attempts;
    settings.retry.wait_duration_ms = 1;
    settings
}

/// In-memory mock for `RecordStore`.
///
/// Keeps insertion order and assigns `rec-N` ids on first save.
#[derive(Default)]
pub struct InMemoryRecordStore {
    records: Mutex<Vec<IntegrationRecord>>,
    next_id: AtomicUsize,
    saves: AtomicUsize,
    fail_loads: AtomicBool,
    /// Saves allowed before every further save fails.
    save_budget: Mutex<Option<usize>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed pending records; each gets an id.
    pub fn with_pending(
        self,
        integration_type: IntegrationType,
        rows: Vec<(&str, String)>,
    ) -> Self {
        for (key, payload) in rows {
            let record = IntegrationRecord::pending(key, integration_type, payload)
                .expect("valid seed record");
            self.insert(record);
        }
        self
    }

    pub fn insert(&self, mut record: IntegrationRecord) -> IntegrationRecord {
        if record.id.is_none() {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            record.id = Some(format!("rec-{id}"));
        }
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|existing| existing.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        record
    }

    pub fn all(&self) -> Vec<IntegrationRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn get(&self, id: &str) -> IntegrationRecord {
        self.all().into_iter().find(|r| r.id.as_deref() == Some(id)).expect("record exists")
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_loads(&self) {
        self.fail_loads.store(true, Ordering::SeqCst);
    }

    pub fn fail_saves_after(&self, allowed: usize) {
        *self.save_budget.lock().unwrap() = Some(allowed);
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find_by_status_and_type(
        &self,
        status: IntegrationStatus,
        integration_type: IntegrationType,
    ) -> DomainResult<Vec<IntegrationRecord>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(HubRelayError::Database("store offline".into()));
        }
        Ok(self
            .all()
            .into_iter()
            .filter(|r| r.status == status && r.integration_type == integration_type)
            .collect())
    }

    async fn save(&self, record: IntegrationRecord) -> DomainResult<IntegrationRecord> {
        {
            let mut budget = self.save_budget.lock().unwrap();
            if let Some(remaining) = budget.as_mut() {
                if *remaining == 0 {
                    return Err(HubRelayError::Database("disk full".into()));
                }
                *remaining -= 1;
            }
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(self.insert(record))
    }
}

/// In-memory mock for `TokenCache`.
#[derive(Default)]
pub struct InMemoryTokenCache {
    entries: Mutex<HashMap<String, String>>,
    deleted: Mutex<Vec<String>>,
}

impl InMemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries.lock().unwrap().insert(key.to_string(), value.to_string());
        self
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn get(&self, key: &str) -> DomainResult<Option<String>> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str) -> DomainResult<()> {
        self.entries.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> DomainResult<()> {
        self.entries.lock().unwrap().remove(key);
        self.deleted.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

/// Scripted mock for `HubClient`.
///
/// Tokens in `valid_tokens` pass validation, anything else gets a 401.
/// Issued tokens and submit responses are consumed in order; once the
/// scripts run out, issue returns `None` and submit returns id 1.
#[derive(Default)]
pub struct FakeHubClient {
    valid_tokens: Mutex<HashSet<String>>,
    issued_tokens: Mutex<VecDeque<Option<String>>>,
    submit_responses: Mutex<VecDeque<Result<DispatchResult, HubError>>>,
    submitted: Mutex<Vec<(String, HubBatch)>>,
    issue_calls: AtomicUsize,
    validate_calls: AtomicUsize,
}

impl FakeHubClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepting(self, raw_token: &str) -> Self {
        self.valid_tokens.lock().unwrap().insert(format!("Bearer {raw_token}"));
        self
    }

    pub fn issuing(self, token: Option<&str>) -> Self {
        self.issued_tokens.lock().unwrap().push_back(token.map(str::to_string));
        self
    }

    pub fn responding(self, response: Result<DispatchResult, HubError>) -> Self {
        self.submit_responses.lock().unwrap().push_back(response);
        self
    }

    pub fn issue_calls(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    /// `(authorization header, batch)` per submit call.
    pub fn submitted(&self) -> Vec<(String, HubBatch)> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl HubClient for FakeHubClient {
    async fn submit_batch(
        &self,
        token: &BearerToken,
        batch: &HubBatch,
    ) -> Result<DispatchResult, HubError> {
        self.submitted.lock().unwrap().push((token.as_str().to_string(), batch.clone()));
        self.submit_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(DispatchResult::success(1, 200)))
    }

    async fn issue_token(
        &self,
        _credentials: &PartitionCredentials,
    ) -> Result<Option<String>, HubError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.issued_tokens.lock().unwrap().pop_front().flatten())
    }

    async fn validate_token(&self, token: &BearerToken) -> Result<(), HubError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        if self.valid_tokens.lock().unwrap().contains(token.as_str()) {
            Ok(())
        } else {
            Err(HubError::status(401, "Unauthorized"))
        }
    }
}

/// Records every dispatch and answers with a fixed result.
pub struct RecordingDispatch<T> {
    calls: Mutex<Vec<(String, Vec<T>)>>,
    result: DispatchResult,
}

impl<T: Clone> RecordingDispatch<T> {
    pub fn returning(result: DispatchResult) -> Self {
        Self { calls: Mutex::new(Vec::new()), result }
    }

    pub fn calls(&self) -> Vec<(String, Vec<T>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl<T: Send + 'static> BatchDispatch<T> for RecordingDispatch<T> {
    async fn dispatch(&self, items: Vec<T>, partition_key: &str) -> DispatchResult {
        self.calls.lock().unwrap().push((partition_key.to_string(), items));
        self.result.clone()
    }
}

pub fn credentials() -> PartitionCredentials {
    PartitionCredentials { api_key: "api-key".into(), secret_key: "secret".into() }
}
