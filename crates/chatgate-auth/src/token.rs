//! Token identifiers and expiry claims.
//!
//! Raw tokens never reach the cache. A token is stored and looked up by the
//! SHA-256 hex digest of its bytes, and its blacklist lifetime comes from its
//! own `exp` claim.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::error::{SessionError, SessionResult};

/// Stable identifier of a token: lowercase hex SHA-256 of the raw token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenIdentifier(String);

impl TokenIdentifier {
    /// Hashes a raw token.
    pub fn from_raw(raw_token: &str) -> Self {
        Self(hex::encode(Sha256::digest(raw_token.as_bytes())))
    }

    /// Wraps an already computed digest.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` unless `digest` is 64 hex characters.
    pub fn from_digest(digest: &str) -> SessionResult<Self> {
        if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(SessionError::invalid_token("token digest must be 64 hex characters"));
        }
        Ok(Self(digest.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Deserialize)]
struct ExpiryClaim {
    exp: Option<i64>,
}

/// Reads the `exp` claim of a JWT without verifying its signature.
///
/// Only for sizing blacklist entries. Signature checks belong to the token
/// validator upstream.
///
/// # Errors
///
/// Returns `InvalidToken` for anything that is not a three-part JWT with a
/// JSON payload carrying a numeric `exp`.
pub fn peek_expiry(raw_jwt: &str) -> SessionResult<OffsetDateTime> {
    let mut parts = raw_jwt.split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(SessionError::invalid_token("expected three dot-separated segments")),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| SessionError::invalid_token(format!("payload is not base64url: {e}")))?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes)
        .map_err(|e| SessionError::invalid_token(format!("payload is not a JSON object: {e}")))?;
    let exp = claim
        .exp
        .ok_or_else(|| SessionError::invalid_token("missing exp claim"))?;

    OffsetDateTime::from_unix_timestamp(exp)
        .map_err(|e| SessionError::invalid_token(format!("exp out of range: {e}")))
}

/// Time left until `expires_at`, zero once it has passed.
pub fn remaining_lifetime(expires_at: OffsetDateTime, now: OffsetDateTime) -> Duration {
    Duration::try_from(expires_at - now).unwrap_or(Duration::ZERO)
}
