//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use sigdesk_identity::TokenSigner;
use sigdesk_service::{seed_defaults, SigdeskService};
use sigdesk_storage::{InMemoryObjectStore, InMemoryStorage};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Sigdesk daemon server
pub struct Server {
    config: DaemonConfig,
    service: Arc<SigdeskService>,
    storage: Arc<InMemoryStorage>,
}

impl Server {
    /// Assemble the application from configuration.
    pub fn new(config: DaemonConfig) -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        let objects = Arc::new(InMemoryObjectStore::new());
        let signer = TokenSigner::new(
            &config.auth.jwt_secret,
            chrono::Duration::hours(config.auth.token_ttl_hours),
        );
        let service = Arc::new(SigdeskService::new(storage.clone(), objects, signer));
        Self {
            config,
            service,
            storage,
        }
    }

    /// Seed defaults and serve until shutdown.
    pub async fn run(self) -> DaemonResult<()> {
        seed_defaults(
            self.storage.as_ref(),
            &self.config.seed.admin_username,
            &self.config.seed.admin_password,
        )
        .await
        .map_err(|e| DaemonError::Config(format!("seeding failed: {}", e)))?;

        let state = AppState::new(self.service.clone());
        let app = create_router(state, self.config.server.enable_cors);

        let addr = self.config.server.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("sigdesk daemon listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("sigdesk daemon stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "failed to install sigterm handler"),
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
