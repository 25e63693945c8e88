use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use lti_tool::middleware::{ToolConfig, app};
use lti_tool::session::MemorySessionStore;
use lti_tool::wordpress::WordPressGateway;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

const PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ToolConfig::from_env().context("invalid configuration")?;
    if !config.missing().is_empty() {
        tracing::warn!(
            missing = ?config.missing(),
            "LTI login and launch are disabled until configuration is complete"
        );
    }

    let sessions = Arc::new(
        MemorySessionStore::new()
            .with_ttl(config.session_ttl().try_into().context("SESSION_TTL_HOURS")?)
            .with_launch_ttl(config.launch_ttl().try_into().context("launch TTL")?),
    );
    let gateway = WordPressGateway::from_env().context("invalid WordPress configuration")?;
    info!(gateway = ?gateway, registrations = config.registry().len(), "Configuration loaded");

    let purge = tokio::spawn(purge_sessions(sessions.clone()));

    let router = app(config, sessions, Arc::new(gateway)).layer(TraceLayer::new_for_http());

    let port = match std::env::var("PORT") {
        Ok(port) => port.parse::<u16>().context("PORT")?,
        Err(_) => 3333,
    };
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("Starting server on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    purge.abort();
    info!("Server shut down gracefully");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("lti_tool=info,tower_http=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn purge_sessions(sessions: Arc<MemorySessionStore>) {
    let mut interval = tokio::time::interval(PURGE_INTERVAL);
    loop {
        interval.tick().await;
        sessions.purge_expired().await;
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
