//! Session records as stored in the cache.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::token::TokenIdentifier;

/// Client details captured at login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Human label such as "Firefox on Linux".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// One login.
///
/// `expires_at` is fixed at creation. Touching or rotating a session never
/// moves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub user_id: String,
    pub token_hash: TokenIdentifier,
    pub refresh_token_hash: TokenIdentifier,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity: OffsetDateTime,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,
}

impl SessionRecord {
    /// Whether the session can still authenticate at `now`.
    pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
        self.is_active && self.expires_at > now
    }
}

/// Entry in a user's session index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct IndexedSession {
    pub session_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Value stored under a blacklisted token identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BlacklistEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub revoked_at: OffsetDateTime,
}
