//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use enrollment_engine::{EnrollmentOrchestrator, Services};
use enrollment_types::ChainEvent;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Enrollment daemon server
pub struct Server {
    config: DaemonConfig,
    orchestrator: Arc<EnrollmentOrchestrator>,
}

impl Server {
    /// Create a server backed by the in-memory collaborators
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        Self::with_services(config, Services::in_memory())
    }

    /// Create a server with explicit collaborator implementations
    pub fn with_services(config: DaemonConfig, services: Services) -> DaemonResult<Self> {
        let orchestrator =
            EnrollmentOrchestrator::with_services(config.orchestrator.clone(), services)?;

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
        })
    }

    /// Run the server until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        let state = AppState::new(self.orchestrator.clone());
        let app = create_router(state, self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "Enrollment daemon listening");

        let event_logger = tokio::spawn(log_chain_events(self.orchestrator.subscribe()));

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        info!(
            active_chains = self.orchestrator.get_stats().active,
            "Enrollment daemon shutting down"
        );
        event_logger.abort();

        Ok(())
    }
}

/// Mirror the chain event stream into the log
async fn log_chain_events(mut rx: broadcast::Receiver<ChainEvent>) {
    loop {
        match rx.recv().await {
            Ok(ChainEvent::ChainCompleted {
                chain_id,
                status,
                duration_ms,
                ..
            }) => {
                info!(%chain_id, ?status, duration_ms, "Chain event: completed");
            }
            Ok(ChainEvent::DuplicateSuppressed {
                chain_id,
                dedupe_key,
                ..
            }) => {
                info!(%chain_id, %dedupe_key, "Chain event: duplicate suppressed");
            }
            Ok(event) => {
                debug!(chain_id = %event.chain_id(), ?event, "Chain event");
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Chain event logger lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
