//! Rate limiting error types.
//!
//! Limiter decisions never fail: cache outages fold into fail-open
//! decisions. These errors only cross the violation store boundary.

/// Errors raised by a [`ViolationStore`](crate::ViolationStore) implementation.
#[derive(Debug, thiserror::Error)]
pub enum ViolationStoreError {
    /// The backing store could not be reached.
    #[error("Violation store unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// The store rejected the record.
    #[error("Violation store rejected record: {message}")]
    Rejected {
        /// Description of why the record was rejected.
        message: String,
    },
}

impl ViolationStoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

/// Errors raised while building a limiter.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for violation store operations.
pub type ViolationResult<T> = Result<T, ViolationStoreError>;
