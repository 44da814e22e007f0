//! Violation records and their durable store.
//!
//! A violation record is written every time a request is denied by the
//! sliding window. The cache only knows whether an identity is blocked right
//! now; the full history belongs to a relational store behind
//! [`ViolationStore`].
//!
//! # Delivery
//!
//! Writes are best effort. The limiter logs a failed write and moves on, so
//! a record can be lost during a store outage.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ViolationResult;

/// One denied (identity, endpoint) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub identity: String,
    pub endpoint: String,
    pub method: Option<String>,

    /// Number of denials since the first one. Never decreases.
    pub violation_count: u64,

    #[serde(with = "time::serde::rfc3339")]
    pub first_violation: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub last_violation: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339::option")]
    pub blocked_until: Option<OffsetDateTime>,
}

impl ViolationRecord {
    /// A record for a denial at `at`, with a count of one.
    pub fn new(identity: &str, endpoint: &str, method: Option<&str>, at: OffsetDateTime) -> Self {
        Self {
            identity: identity.to_string(),
            endpoint: endpoint.to_string(),
            method: method.map(str::to_string),
            violation_count: 1,
            first_violation: at,
            last_violation: at,
            blocked_until: None,
        }
    }

    /// Whether the record still blocks requests at `now`.
    pub fn is_blocked_at(&self, now: OffsetDateTime) -> bool {
        self.blocked_until.is_some_and(|until| until > now)
    }
}

/// Storage trait for violation records.
///
/// # Implementations
///
/// - [`InMemoryViolationStore`] for development and tests
/// - a relational implementation in the deployment that owns the audit tables
#[async_trait]
pub trait ViolationStore: Send + Sync {
    /// Creates or updates the record for `(record.identity, record.endpoint)`.
    ///
    /// An existing record keeps its `first_violation`, takes the new
    /// `last_violation`, `method` and `blocked_until`, and increments its
    /// count. Returns the stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn record(&self, record: &ViolationRecord) -> ViolationResult<ViolationRecord>;

    /// Loads the record for `(identity, endpoint)`.
    async fn find(&self, identity: &str, endpoint: &str) -> ViolationResult<Option<ViolationRecord>>;
}

/// Process-local [`ViolationStore`].
#[derive(Debug, Default)]
pub struct InMemoryViolationStore {
    records: DashMap<(String, String), ViolationRecord>,
}

impl InMemoryViolationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl ViolationStore for InMemoryViolationStore {
    async fn record(&self, record: &ViolationRecord) -> ViolationResult<ViolationRecord> {
        let key = (record.identity.clone(), record.endpoint.clone());
        let stored = self
            .records
            .entry(key)
            .and_modify(|existing| {
                existing.violation_count += 1;
                existing.last_violation = record.last_violation;
                existing.method = record.method.clone();
                existing.blocked_until = record.blocked_until;
            })
            .or_insert_with(|| ViolationRecord {
                violation_count: 1,
                ..record.clone()
            });
        Ok(stored.clone())
    }

    async fn find(&self, identity: &str, endpoint: &str) -> ViolationResult<Option<ViolationRecord>> {
        Ok(self
            .records
            .get(&(identity.to_string(), endpoint.to_string()))
            .map(|r| r.clone()))
    }
}
