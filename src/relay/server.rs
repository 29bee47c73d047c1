//! Usage: Relay server lifecycle (shared state, bind, serve, graceful shutdown).

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::listen;
use super::routes::build_router;
use crate::infra::settings::RelayConfig;
use crate::protocol::EXCHANGE_TOKEN_PATH;
use crate::shared::error::AppResult;

/// Per-request handlers only read this; it is cloned into every request.
#[derive(Clone)]
pub(crate) struct RelayAppState {
    pub(crate) config: Arc<RelayConfig>,
    pub(crate) client: reqwest::Client,
}

impl RelayAppState {
    pub(crate) fn new(config: RelayConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("github-pkce-relay/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.upstream_connect_timeout)
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|e| format!("SYSTEM_ERROR: relay http client init failed: {e}"))?;
        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }
}

fn log_startup_warnings(config: &RelayConfig) {
    if !config.is_exchange_configured() {
        tracing::warn!(
            "GITHUB_CLIENT_ID / GITHUB_CLIENT_SECRET are not set; token exchanges will fail with a configuration error"
        );
    }
    if config.github_redirect_uri.is_none() {
        tracing::warn!("GITHUB_REDIRECT_URI is not set; redirect_uri will be omitted from token requests");
    }
    if config.frontend_origin.is_none() {
        tracing::warn!("FRONTEND_URL is not set; no cross-origin access will be granted");
    }
}

async fn bind(config: &RelayConfig) -> AppResult<tokio::net::TcpListener> {
    let bind_addr = config.listen_address();
    tokio::net::TcpListener::bind((config.listen_host.as_str(), config.port))
        .await
        .map_err(|e| format!("SYSTEM_ERROR: failed to bind {bind_addr}: {e}").into())
}

/// Serves until `signal` resolves. Used by the binary.
pub async fn serve<F>(config: RelayConfig, signal: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    log_startup_warnings(&config);
    let listener = bind(&config).await?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("SYSTEM_ERROR: failed to read local address: {e}"))?;
    let app = build_router(RelayAppState::new(config)?);

    tracing::info!(bind_addr = %local_addr, "github pkce relay listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| format!("SYSTEM_ERROR: relay server error: {e}"))?;
    tracing::info!("github pkce relay stopped");
    Ok(())
}

/// A relay running on a background task, stopped with [`RelayServer::shutdown`].
pub struct RelayServer {
    local_addr: SocketAddr,
    base_url: String,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RelayServer {
    pub async fn start(config: RelayConfig) -> AppResult<Self> {
        log_startup_warnings(&config);
        let listener = bind(&config).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| format!("SYSTEM_ERROR: failed to read local address: {e}"))?;

        let base_host = if listen::is_wildcard_host(&config.listen_host) {
            "127.0.0.1".to_string()
        } else {
            config.listen_host.clone()
        };
        let base_url = format!(
            "http://{}",
            listen::format_host_port(&base_host, local_addr.port())
        );

        let app = build_router(RelayAppState::new(config)?);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(err) = serve.await {
                tracing::error!(bind_addr = %local_addr, "relay server error: {}", err);
            }
        });

        tracing::info!(bind_addr = %local_addr, "github pkce relay started");
        Ok(Self {
            local_addr,
            base_url,
            shutdown: shutdown_tx,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn exchange_token_url(&self) -> String {
        format!("{}{EXCHANGE_TOKEN_PATH}", self.base_url)
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.task.await {
            tracing::warn!("relay server task ended abnormally: {err}");
        }
    }
}
