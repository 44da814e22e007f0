//! # chatgate-server
//!
//! HTTP edge for the chatgate cache, rate limiting and session crates.
//!
//! ```text
//! request → TraceLayer → TimeoutLayer → rate_limit_middleware → blacklist_middleware → handler
//!                                            │ 429 + Retry-After     │ 401
//! ```

pub mod config;
pub mod error;
pub mod maintenance;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{AppConfig, LoggingConfig, MaintenanceConfig, ServerConfig};
pub use error::ServerError;
pub use routes::build_router;
pub use server::{Server, ServerBuilder};
pub use state::AppState;
