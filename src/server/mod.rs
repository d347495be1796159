//! HTTP server exposing the churn analysis endpoint

mod api;
mod error;
mod handlers;

pub use api::create_router;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::session::AnalysisSession;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Serve the analysis endpoint until ctrl+c
pub async fn run_server(config: ServerConfig, session: Arc<AnalysisSession>) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    let app = create_router(session);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        address = %addr,
        pid = std::process::id(),
        started_at = %start_time.to_rfc3339(),
        "Churn analysis server listening"
    );

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl+c");
            return;
        }
        let uptime = chrono::Utc::now().signed_duration_since(start_time);
        info!(
            uptime_secs = uptime.num_seconds(),
            "Shutdown signal received, stopping server gracefully"
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
