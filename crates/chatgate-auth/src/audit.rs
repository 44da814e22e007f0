//! Durable audit trail for session lifecycle events.
//!
//! The cache copy of a session vanishes with its TTL. Deployments that need a
//! history plug a relational implementation of [`SessionAuditStore`] into the
//! session store. Audit writes are best effort.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::SessionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    Created,
    Rotated,
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session_id: Uuid,
    pub user_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

impl SessionEvent {
    pub fn new(kind: SessionEventKind, session_id: Uuid, user_id: &str, at: OffsetDateTime) -> Self {
        Self {
            kind,
            session_id,
            user_id: user_id.to_string(),
            at,
        }
    }
}

/// Storage trait for session audit events.
#[async_trait]
pub trait SessionAuditStore: Send + Sync {
    /// Appends one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn append(&self, event: &SessionEvent) -> SessionResult<()>;

    /// Events for one session, oldest first.
    async fn events_for(&self, session_id: Uuid) -> SessionResult<Vec<SessionEvent>>;
}

/// Process-local [`SessionAuditStore`].
#[derive(Debug, Default)]
pub struct InMemorySessionAudit {
    events: Mutex<Vec<SessionEvent>>,
}

impl InMemorySessionAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl SessionAuditStore for InMemorySessionAudit {
    async fn append(&self, event: &SessionEvent) -> SessionResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }

    async fn events_for(&self, session_id: Uuid) -> SessionResult<Vec<SessionEvent>> {
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }
}
