//! # chatgate-auth
//!
//! Login sessions and access token revocation, stored through
//! [`chatgate_cache::CacheManager`].
//!
//! Every cache entry written here lives exactly as long as the thing it
//! describes: a session record until the session expires, a blacklist entry
//! until the revoked token would have expired.

pub mod audit;
pub mod config;
pub mod error;
mod metrics;
pub mod session;
pub mod store;
pub mod token;

pub use audit::{InMemorySessionAudit, SessionAuditStore, SessionEvent, SessionEventKind};
pub use config::{FailurePolicy, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use metrics::TOKEN_BLACKLIST_CHECKS_TOTAL;
pub use session::{DeviceInfo, SessionRecord};
pub use store::{BLACKLIST_NAMESPACE, SESSION_NAMESPACE, SessionStore, USER_INDEX_NAMESPACE};
pub use token::{TokenIdentifier, peek_expiry, remaining_lifetime};
