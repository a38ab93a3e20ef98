mod handlers;
mod router;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::brain::SqlAgent;
use crate::core::config::ServerConfig;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) agent: Arc<SqlAgent>,
}

impl AppState {
    pub(crate) fn new(agent: Arc<SqlAgent>) -> Self {
        Self { agent }
    }
}

pub struct ApiServer {
    state: AppState,
    host: String,
    port: u16,
    cors_origins: Vec<String>,
}

impl ApiServer {
    pub fn new(agent: Arc<SqlAgent>, server: &ServerConfig) -> Self {
        Self {
            state: AppState::new(agent),
            host: server.host.clone(),
            port: server.port,
            cors_origins: server.cors_origins.clone(),
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Serves until Ctrl+C.
    pub async fn run(self) -> Result<()> {
        let addr = self.address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding API server to {}", addr))?;
        let app = router::build_api_router(self.state, &self.cors_origins);

        info!("API Server running at http://{addr}");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("API server crashed")?;
        info!("API Server shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, draining connections"),
        Err(e) => {
            warn!("Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
