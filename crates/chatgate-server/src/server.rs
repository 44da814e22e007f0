use std::net::SocketAddr;

use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::error::ServerError;
use crate::maintenance::start_maintenance_task;
use crate::routes::build_router;
use crate::state::AppState;

pub struct ServerBuilder {
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Connects the cache and builds the router.
    ///
    /// # Errors
    ///
    /// Fails for invalid configuration or a required but unreachable Redis.
    pub async fn build(self) -> Result<Server, ServerError> {
        let addr = self.config.addr();
        let state = AppState::build(self.config).await?;
        crate::metrics::init_metrics();
        let app = build_router(state.clone());
        Ok(Server { addr, app, state })
    }
}

pub struct Server {
    addr: SocketAddr,
    app: Router,
    state: AppState,
}

impl Server {
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serves until Ctrl+C or SIGTERM, then stops background work.
    pub async fn run(self) -> Result<(), ServerError> {
        let cancel = CancellationToken::new();
        let maintenance = self.spawn_maintenance(&cancel);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        cancel.cancel();
        if let Some(handle) = maintenance {
            let _ = handle.await;
        }
        self.state.cache.shutdown().await;
        tracing::info!("server stopped");
        Ok(())
    }

    fn spawn_maintenance(&self, cancel: &CancellationToken) -> Option<JoinHandle<()>> {
        let config = &self.state.config.maintenance;
        if !config.enabled {
            tracing::info!("maintenance task disabled");
            return None;
        }
        Some(start_maintenance_task(
            self.state.sessions.clone(),
            self.state.cache.clone(),
            config.interval,
            cancel.clone(),
        ))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
