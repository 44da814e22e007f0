//! Session store error types.

use std::time::Duration;

/// Errors that can occur during session and revocation operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The cache could not complete a write or read the session needs.
    #[error("Session storage unavailable: {message}")]
    Unavailable {
        /// Description of the failed operation.
        message: String,
    },

    /// The token is malformed or carries no usable expiry claim.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// A session lifetime of zero or above the configured maximum.
    #[error("Invalid session lifetime {ttl:?} (max {max:?})")]
    InvalidTtl { ttl: Duration, max: Duration },

    /// The audit collaborator rejected a write.
    #[error("Session audit failed: {message}")]
    Audit {
        /// Description of the failure.
        message: String,
    },
}

impl SessionError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    pub fn audit(message: impl Into<String>) -> Self {
        Self::Audit {
            message: message.into(),
        }
    }

    /// Whether the failure is a storage outage rather than bad input.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
