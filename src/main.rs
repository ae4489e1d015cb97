//! Jobdesk server entry point.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobdesk::config::JobdeskConfig;
use jobdesk::error::Result;
use jobdesk::store::Database;
use jobdesk::seed;
use jobdesk::web::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // RUST_LOG controls verbosity, e.g. RUST_LOG=jobdesk=debug
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Jobdesk server starting...");

    let config = JobdeskConfig::from_env()?;
    tracing::info!("Configuration loaded");

    let db = Arc::new(Database::new(&config.database_path).await?);
    tracing::info!(path = %config.database_path, "Database initialized");

    seed::run(&db, &config).await?;

    let state = AppState::new(db, &config);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| {
            jobdesk::error::JobdeskError::Config(format!(
                "Failed to bind {}: {}",
                config.bind_addr, e
            ))
        })?;
    tracing::info!(addr = %config.bind_addr, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| jobdesk::error::JobdeskError::Config(format!("Server error: {}", e)))?;

    tracing::info!("Jobdesk server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        sig.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
