//! # chatgate-cache
//!
//! Resilient cache layer with two interchangeable tiers.
//!
//! ## Architecture
//!
//! - **Networked (Redis)**: shared across instances, millisecond latency,
//!   per-call timeout
//! - **Local (DashMap)**: in-process expiring store with lazy expiry and a
//!   periodic sweep, single-instance only
//!
//! ```text
//! caller → CacheManager ──(chosen once at startup)──┬─→ RedisStore    (cache.redis set)
//!          namespacing, serde, error folding        └─→ ExpiringStore (otherwise)
//! ```
//!
//! Every logical key is stored as `<prefix>:<namespace>:<key>` and every
//! entry carries a TTL.

pub mod config;
pub mod error;
pub mod key;
pub mod local;
pub mod manager;
mod metrics;
pub mod networked;
pub mod store;

pub use config::{BackendSelection, CacheConfig, RedisConfig};
pub use error::{CacheError, CacheResult, ConfigError};
pub use key::{DEFAULT_NAMESPACE, KeyBuilder};
pub use local::ExpiringStore;
pub use manager::{CacheHealth, CacheManager, Lookup};
pub use metrics::CACHE_OPERATIONS_TOTAL;
pub use networked::RedisStore;
pub use store::{BackendKind, CacheStore};
