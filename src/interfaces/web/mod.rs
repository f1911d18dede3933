pub(crate) mod auth;
mod handlers;
mod router;
#[cfg(test)]
pub(crate) mod testing;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::core::config::AppConfig;
use crate::core::graph::{GraphActions, GraphApi};
use crate::core::lifecycle::LifecycleComponent;
use crate::core::minutes::{MinutesGenerator, MinutesWriter};
use crate::core::oauth::{AzureAdProvider, CredentialProvider, PendingLogins};
use crate::core::store::Store;
use crate::core::store::types::UserRecord;

pub(crate) use router::build_api_router;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Store,
    pub(crate) config: Arc<AppConfig>,
    pub(crate) credentials: Arc<dyn CredentialProvider>,
    pub(crate) minutes: Arc<dyn MinutesWriter>,
    pub(crate) graph: Arc<dyn GraphActions>,
    /// Direct Graph access for diagnostics that sit outside workflow runs.
    pub(crate) graph_api: GraphApi,
    pub(crate) pending_logins: Arc<PendingLogins>,
}

impl AppState {
    pub(crate) fn from_config(config: AppConfig, store: Store) -> Result<Self> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let graph_api = GraphApi::new(&config.graph_base_url, timeout)?;
        Ok(Self {
            store,
            credentials: Arc::new(AzureAdProvider::from_config(&config)?),
            minutes: Arc::new(MinutesGenerator::from_config(&config)?),
            graph: Arc::new(graph_api.clone()),
            graph_api,
            pending_logins: Arc::new(PendingLogins::default()),
            config: Arc::new(config),
        })
    }
}

/// The signed-in user for the current request, inserted by [`auth::require_auth`].
#[derive(Debug, Clone)]
pub(crate) struct CurrentUser {
    pub(crate) user: UserRecord,
    pub(crate) access_token: String,
    pub(crate) session_token: String,
}

pub struct ApiServer {
    state: AppState,
    host: String,
    port: u16,
    bound: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub(crate) fn new(state: AppState) -> Self {
        Self {
            host: state.config.host.clone(),
            port: state.config.port,
            state,
            bound: None,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Address actually bound; differs from the configured one when port 0 was requested.
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound
    }
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API server initializing...");
        if self.state.config.uses_default_session_secret() {
            warn!("SESSION_SECRET is not set; stored tokens are encrypted with the default key");
        }
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server to {}", addr))?;
        let bound = listener.local_addr()?;
        self.bound = Some(bound);

        let app = build_api_router(self.state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        info!("API server running at http://{}", bound);
        self.handle = Some(tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                error!("API server crashed: {}", e);
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API server shutting down...");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await?;
        }
        Ok(())
    }
}
