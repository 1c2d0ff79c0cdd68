use std::sync::Arc;

use kyc_ledger::Ledger;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::documents::DirectoryDocumentStore;
use crate::error::{ServerError, ServerResult};
use crate::profile::JsonFileProfileStore;
use crate::router::build_router;
use crate::state::AppState;

/// KYC ledger server.
pub struct KycServer {
    config: ServerConfig,
    state: AppState,
}

impl KycServer {
    /// Open the journal-backed ledger and the stores named by `config`.
    ///
    /// Fails if the journal does not validate.
    pub async fn open(config: ServerConfig) -> ServerResult<Self> {
        let journal = config.journal_path();
        let sync_mode = config.sync_mode;
        let ledger = tokio::task::spawn_blocking(move || Ledger::open(&journal, sync_mode))
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))??;

        let profiles = JsonFileProfileStore::open(&config.profiles_path()).await?;
        let documents = DirectoryDocumentStore::open(&config.upload_dir).await?;
        let state = AppState::new(Arc::new(ledger), Arc::new(profiles), Arc::new(documents));
        Ok(Self { config, state })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> ServerResult<axum::Router> {
        build_router(self.state.clone(), &self.config)
    }

    /// Serve requests until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router()?;
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            entries = self.state.ledger().len()?,
            "KYC server listening"
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
