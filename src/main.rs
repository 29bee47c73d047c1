use github_pkce_relay::{app::logging, relay, AppResult, RelayConfig};
use tokio::signal;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("github-pkce-relay: {err}");
        std::process::exit(1);
    }
}

async fn run() -> AppResult<()> {
    let config = RelayConfig::load()?;
    let _log_guard = logging::init(config.log_dir.as_deref())?;
    tracing::debug!(config = ?config, "relay configuration loaded");
    relay::serve(config, shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
        tracing::info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("received terminate signal, shutting down");
            }
            Err(err) => {
                tracing::error!("failed to install SIGTERM handler: {err}");
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
}
