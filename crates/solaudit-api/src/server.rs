use crate::{create_router, AppState};
use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

/// Serves the router on the configured `server.host` and `server.port`.
pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Host names are resolved, so `localhost` works as well as an IP literal.
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let server = &self.state.config.server;
        TcpListener::bind((server.host.as_str(), server.port))
            .await
            .with_context(|| format!("failed to bind {}:{}", server.host, server.port))
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        let addr = listener.local_addr().context("listener has no local address")?;
        let analyzer = self.state.config.analyzer.command.clone();
        let router = create_router(self.state);

        info!("Server listening on http://{}", addr);
        info!(%analyzer, "Static analyzer command");
        info!("API endpoints:");
        info!("  POST /analyze - Static analysis plus narrative summary");
        info!("  POST /insights - Risk score and fix hints for a report");
        info!("  GET /health - Liveness check");
        info!("  GET /metrics - Prometheus metrics");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
