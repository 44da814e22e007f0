//! Session and token revocation store over the cache facade.
//!
//! | namespace         | key                 | value                  | TTL                          |
//! |-------------------|---------------------|------------------------|------------------------------|
//! | `session`         | session id          | [`SessionRecord`]      | session's remaining lifetime |
//! | `session_user`    | user id             | session ids + expiries | latest session expiry        |
//! | `token_blacklist` | token identifier    | revocation timestamp   | token's remaining lifetime   |
//!
//! # Session states
//!
//! ```text
//! create ─→ active ──touch/rotate──→ active
//!              │                        │
//!              ├──revoke──→ revoked     │
//!              └──TTL──→ gone ←─────────┘
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chatgate_cache::{CacheManager, Lookup};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::audit::{SessionAuditStore, SessionEvent, SessionEventKind};
use crate::config::{FailurePolicy, SessionConfig};
use crate::error::{SessionError, SessionResult};
use crate::metrics::record_check;
use crate::session::{BlacklistEntry, DeviceInfo, IndexedSession, SessionRecord};
use crate::token::{TokenIdentifier, peek_expiry, remaining_lifetime};

pub const SESSION_NAMESPACE: &str = "session";
pub const USER_INDEX_NAMESPACE: &str = "session_user";
pub const BLACKLIST_NAMESPACE: &str = "token_blacklist";

/// Login sessions and revoked access tokens.
///
/// Cloning is cheap; clones share the cache and audit store.
#[derive(Clone)]
pub struct SessionStore {
    cache: CacheManager,
    failure_policy: FailurePolicy,
    max_session_ttl: Duration,
    audit: Option<Arc<dyn SessionAuditStore>>,
}

impl SessionStore {
    pub fn new(cache: CacheManager, config: &SessionConfig) -> Self {
        Self {
            cache,
            failure_policy: config.blacklist_failure_policy,
            max_session_ttl: config.max_session_ttl,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn SessionAuditStore>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Records a new login and returns its session id.
    ///
    /// # Errors
    ///
    /// - `InvalidTtl` for a zero lifetime or one above `max_session_ttl`
    /// - `Unavailable` if the session could not be written
    pub async fn create_session(
        &self,
        user_id: &str,
        token_hash: TokenIdentifier,
        refresh_token_hash: TokenIdentifier,
        ttl: Duration,
        device_info: Option<DeviceInfo>,
    ) -> SessionResult<Uuid> {
        if ttl.is_zero() || ttl > self.max_session_ttl {
            return Err(SessionError::InvalidTtl {
                ttl,
                max: self.max_session_ttl,
            });
        }

        let now = OffsetDateTime::now_utc();
        let record = SessionRecord {
            session_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            token_hash,
            refresh_token_hash,
            created_at: now,
            expires_at: now + ttl,
            last_activity: now,
            is_active: true,
            device_info,
        };

        let key = record.session_id.to_string();
        if !self.cache.set(&key, &record, ttl, Some(SESSION_NAMESPACE)).await {
            return Err(SessionError::unavailable("failed to store session"));
        }

        self.index_session(&record, now).await;
        self.audit(SessionEventKind::Created, &record, now).await;
        tracing::info!(user_id = %user_id, ttl_secs = ttl.as_secs(), "session created");
        tracing::debug!(session_id = %record.session_id, "session stored");

        Ok(record.session_id)
    }

    /// Loads a session that is still stored, active or revoked.
    pub async fn get_session(&self, session_id: Uuid) -> Option<SessionRecord> {
        self.cache
            .get(&session_id.to_string(), Some(SESSION_NAMESPACE))
            .await
    }

    /// Like [`get_session`](Self::get_session), but tells a missing session
    /// apart from a cache failure.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the session could not be read.
    pub async fn find_session(&self, session_id: Uuid) -> SessionResult<Option<SessionRecord>> {
        match self
            .cache
            .lookup::<SessionRecord>(&session_id.to_string(), Some(SESSION_NAMESPACE))
            .await
        {
            Lookup::Found(record) => Ok(Some(record)),
            Lookup::Missing => Ok(None),
            Lookup::Unavailable => Err(SessionError::unavailable("failed to read session")),
        }
    }

    /// Updates `last_activity`. The expiry stays where it was.
    ///
    /// Returns `false` for a missing, revoked or expired session, or when the
    /// write failed.
    ///
    /// A revoke blacklists the token before it marks the record inactive, so
    /// a touch that finds the token blacklisted backs off. A touch whose
    /// write lands between a revoke's read and its own write is still
    /// overwritten by the revoke.
    pub async fn touch_session(&self, session_id: Uuid) -> bool {
        let Some(mut record) = self.get_session(session_id).await else {
            return false;
        };

        let now = OffsetDateTime::now_utc();
        if !record.is_live_at(now) {
            return false;
        }
        if !matches!(
            self.cache
                .contains(record.token_hash.as_str(), Some(BLACKLIST_NAMESPACE))
                .await,
            Lookup::Missing
        ) {
            return false;
        }

        record.last_activity = now;
        self.store_until_expiry(&record, now).await
    }

    /// Marks the session inactive and blacklists its access token for the
    /// rest of the session lifetime.
    ///
    /// Returns `Ok(true)` once the session is revoked, including when it
    /// already was, and `Ok(false)` if no such session is stored.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the session could not be read or the
    /// blacklist entry could not be written.
    pub async fn revoke_session(&self, session_id: Uuid) -> SessionResult<bool> {
        let Some(mut record) = self.find_session(session_id).await? else {
            return Ok(false);
        };

        if !record.is_active {
            return Ok(true);
        }

        let now = OffsetDateTime::now_utc();
        let remaining = remaining_lifetime(record.expires_at, now);
        if !self.blacklist_token(&record.token_hash, remaining).await {
            return Err(SessionError::unavailable("failed to blacklist session token"));
        }

        record.is_active = false;
        record.last_activity = now;
        if !self.store_until_expiry(&record, now).await {
            tracing::warn!(session_id = %session_id, "revoked session not marked inactive; token is blacklisted");
        }

        self.audit(SessionEventKind::Revoked, &record, now).await;
        tracing::info!(user_id = %record.user_id, "session revoked");
        tracing::debug!(session_id = %session_id, "session marked inactive");
        Ok(true)
    }

    /// Replaces the session's token hashes after a refresh. The old access
    /// token is blacklisted; `expires_at` does not move.
    ///
    /// Returns `Ok(false)` for a missing, revoked or expired session.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the old token could not be blacklisted or the
    /// session could not be written.
    pub async fn rotate_tokens(
        &self,
        session_id: Uuid,
        new_token_hash: TokenIdentifier,
        new_refresh_token_hash: TokenIdentifier,
    ) -> SessionResult<bool> {
        let Some(mut record) = self.get_session(session_id).await else {
            return Ok(false);
        };

        let now = OffsetDateTime::now_utc();
        if !record.is_live_at(now) {
            return Ok(false);
        }

        let remaining = remaining_lifetime(record.expires_at, now);
        if !self.blacklist_token(&record.token_hash, remaining).await {
            return Err(SessionError::unavailable("failed to blacklist previous token"));
        }

        record.token_hash = new_token_hash;
        record.refresh_token_hash = new_refresh_token_hash;
        record.last_activity = now;
        if !self.store_until_expiry(&record, now).await {
            return Err(SessionError::unavailable("failed to store rotated session"));
        }

        self.audit(SessionEventKind::Rotated, &record, now).await;
        tracing::debug!(session_id = %session_id, "session tokens rotated");
        Ok(true)
    }

    /// Whether the token has been revoked.
    ///
    /// When the cache cannot answer, the configured [`FailurePolicy`]
    /// decides.
    pub async fn is_token_blacklisted(&self, token: &TokenIdentifier) -> bool {
        match self.cache.contains(token.as_str(), Some(BLACKLIST_NAMESPACE)).await {
            Lookup::Found(()) => {
                record_check("blacklisted");
                true
            }
            Lookup::Missing => {
                record_check("clear");
                false
            }
            Lookup::Unavailable => match self.failure_policy {
                FailurePolicy::Open => {
                    record_check("unavailable_open");
                    tracing::warn!(policy = "open", "blacklist unavailable, accepting token");
                    false
                }
                FailurePolicy::Closed => {
                    record_check("unavailable_closed");
                    tracing::warn!(policy = "closed", "blacklist unavailable, rejecting token");
                    true
                }
            },
        }
    }

    /// Blacklists a token until it would have expired on its own.
    ///
    /// `remaining_ttl` must be the token's own remaining lifetime. A zero
    /// lifetime means the token is already dead and nothing is written.
    pub async fn blacklist_token(&self, token: &TokenIdentifier, remaining_ttl: Duration) -> bool {
        if remaining_ttl.is_zero() {
            tracing::debug!(token = %token, "token already expired, not blacklisted");
            return true;
        }

        let entry = BlacklistEntry {
            revoked_at: OffsetDateTime::now_utc(),
        };
        let stored = self
            .cache
            .set(token.as_str(), &entry, remaining_ttl, Some(BLACKLIST_NAMESPACE))
            .await;
        if stored {
            tracing::debug!(token = %token, ttl_secs = remaining_ttl.as_secs(), "token blacklisted");
        }
        stored
    }

    /// Blacklists a raw JWT for the rest of its lifetime, read from its
    /// `exp` claim.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the expiry cannot be read.
    pub async fn revoke_token(&self, raw_token: &str) -> SessionResult<bool> {
        let expires_at = peek_expiry(raw_token)?;
        let remaining = remaining_lifetime(expires_at, OffsetDateTime::now_utc());
        Ok(self
            .blacklist_token(&TokenIdentifier::from_raw(raw_token), remaining)
            .await)
    }

    /// Live sessions of `user_id`. `None` when the cache failed.
    ///
    /// The user index is updated without a lock and concurrent logins can
    /// drop entries from it, so the stored sessions are scanned as well and
    /// the index only adds sessions the scan has not reached yet.
    pub async fn list_user_sessions(&self, user_id: &str) -> Option<Vec<SessionRecord>> {
        let indexed = match self.load_index(user_id).await {
            Lookup::Found(index) => index,
            Lookup::Missing => Vec::new(),
            Lookup::Unavailable => return None,
        };
        let stored = self.cache.keys(Some(SESSION_NAMESPACE)).await?;

        let now = OffsetDateTime::now_utc();
        let mut seen = HashSet::new();
        let candidates = stored
            .iter()
            .filter_map(|key| Uuid::parse_str(key).ok())
            .chain(indexed.iter().filter(|e| e.expires_at > now).map(|e| e.session_id));

        let mut sessions = Vec::new();
        for session_id in candidates {
            if !seen.insert(session_id) {
                continue;
            }
            match self
                .cache
                .lookup::<SessionRecord>(&session_id.to_string(), Some(SESSION_NAMESPACE))
                .await
            {
                Lookup::Found(record) if record.user_id == user_id && record.is_live_at(now) => {
                    sessions.push(record);
                }
                Lookup::Found(_) | Lookup::Missing => {}
                Lookup::Unavailable => return None,
            }
        }
        sessions.sort_by_key(|s| s.created_at);
        Some(sessions)
    }

    /// Revokes every live session of `user_id` and drops the index.
    /// Returns how many sessions were revoked.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the index could not be read or a session
    /// could not be revoked.
    pub async fn revoke_user_sessions(&self, user_id: &str) -> SessionResult<usize> {
        let sessions = self
            .list_user_sessions(user_id)
            .await
            .ok_or_else(|| SessionError::unavailable("failed to read user sessions"))?;

        let mut revoked = 0;
        for session in &sessions {
            if self.revoke_session(session.session_id).await? {
                revoked += 1;
            }
        }

        self.cache.delete(user_id, Some(USER_INDEX_NAMESPACE)).await;
        tracing::info!(user_id = %user_id, revoked, "user sessions revoked");
        Ok(revoked)
    }

    /// Drops expired and revoked sessions from the user's index.
    /// Returns how many entries were removed, `None` when the cache failed.
    pub async fn prune_user_index(&self, user_id: &str) -> Option<usize> {
        let index = match self.load_index(user_id).await {
            Lookup::Found(index) => index,
            Lookup::Missing => return Some(0),
            Lookup::Unavailable => return None,
        };

        let now = OffsetDateTime::now_utc();
        let mut kept = Vec::with_capacity(index.len());
        for entry in &index {
            if entry.expires_at <= now {
                continue;
            }
            match self
                .cache
                .lookup::<SessionRecord>(&entry.session_id.to_string(), Some(SESSION_NAMESPACE))
                .await
            {
                Lookup::Found(record) if !record.is_active => {}
                Lookup::Missing => {}
                Lookup::Found(_) => kept.push(*entry),
                Lookup::Unavailable => return None,
            }
        }

        let removed = index.len() - kept.len();
        if removed > 0 {
            self.store_index(user_id, &kept, now).await;
        }
        Some(removed)
    }

    /// Prunes every user index. Returns total entries removed.
    pub async fn prune_all_indexes(&self) -> Option<usize> {
        let users = self.cache.keys(Some(USER_INDEX_NAMESPACE)).await?;
        let mut removed = 0;
        for user_id in &users {
            removed += self.prune_user_index(user_id).await?;
        }
        Some(removed)
    }

    async fn store_until_expiry(&self, record: &SessionRecord, now: OffsetDateTime) -> bool {
        let remaining = remaining_lifetime(record.expires_at, now);
        if remaining.is_zero() {
            return false;
        }
        self.cache
            .set(&record.session_id.to_string(), record, remaining, Some(SESSION_NAMESPACE))
            .await
    }

    async fn load_index(&self, user_id: &str) -> Lookup<Vec<IndexedSession>> {
        self.cache.lookup(user_id, Some(USER_INDEX_NAMESPACE)).await
    }

    /// Best effort: two logins racing here can drop one entry.
    async fn index_session(&self, record: &SessionRecord, now: OffsetDateTime) {
        let mut index = self.load_index(&record.user_id).await.found().unwrap_or_default();
        index.retain(|e| e.expires_at > now);
        index.push(IndexedSession {
            session_id: record.session_id,
            expires_at: record.expires_at,
        });
        if !self.store_index(&record.user_id, &index, now).await {
            tracing::warn!(user_id = %record.user_id, session_id = %record.session_id, "session not added to user index");
        }
    }

    /// Writes the index with a TTL reaching the latest session expiry, or
    /// deletes it when empty.
    async fn store_index(&self, user_id: &str, index: &[IndexedSession], now: OffsetDateTime) -> bool {
        let latest = index.iter().map(|e| e.expires_at).max();
        match latest.map(|at| remaining_lifetime(at, now)) {
            Some(ttl) if !ttl.is_zero() => {
                self.cache
                    .set(user_id, index, ttl, Some(USER_INDEX_NAMESPACE))
                    .await
            }
            _ => self.cache.delete(user_id, Some(USER_INDEX_NAMESPACE)).await,
        }
    }

    async fn audit(&self, kind: SessionEventKind, record: &SessionRecord, at: OffsetDateTime) {
        let Some(audit) = &self.audit else {
            return;
        };
        let event = SessionEvent::new(kind, record.session_id, &record.user_id, at);
        if let Err(e) = audit.append(&event).await {
            tracing::warn!(session_id = %record.session_id, error = %e, "session audit write failed");
        }
    }
}
