//! REST API Server
//!
//! Serves the REST router and registers with the orchestrator as a
//! frontend plugin.

use crate::config::ORCHESTRATOR_VERSION;
use crate::core::Orchestrator;
use crate::domain::ports::FrontendPlugin;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use super::rest::RestRouter;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: ([0, 0, 0, 0], 8090).into(),
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// REST API server for the orchestrator
pub struct ApiServer {
    config: ApiServerConfig,
    orchestrator: Arc<Orchestrator>,
    shutdown_tx: broadcast::Sender<()>,
    active: AtomicBool,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, orchestrator: Arc<Orchestrator>) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(Self {
            config,
            orchestrator,
            shutdown_tx,
            active: AtomicBool::new(false),
        })
    }

    /// Run the REST server until shutdown is requested.
    pub async fn run(&self) -> Result<()> {
        let router = RestRouter::new(self.orchestrator.clone());
        let app = router.build();

        info!("REST API listening on {}", self.config.rest_addr);
        let listener = tokio::net::TcpListener::bind(self.config.rest_addr)
            .await
            .map_err(|err| Error::Internal(format!("failed to bind REST server: {err}")))?;

        self.active.store(true, Ordering::SeqCst);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("REST server shutting down");
            })
            .await
            .map_err(|err| Error::Internal(format!("REST server error: {err}")))?;
        self.active.store(false, Ordering::SeqCst);

        Ok(())
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[async_trait]
impl FrontendPlugin for ApiServer {
    fn name(&self) -> &str {
        "rest"
    }

    fn version(&self) -> &str {
        ORCHESTRATOR_VERSION
    }

    async fn activate(&self) -> Result<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn deactivate(&self) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        self.shutdown();
        Ok(())
    }
}
