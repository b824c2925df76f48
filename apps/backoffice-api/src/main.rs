//! # Back Office API Server
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  load config ──► open SQLite ──► build gateway (mock | http)            │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  wire settlement pipeline ──► resume loops for pending charges          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  serve HTTP + WebSocket ──► SIGTERM / Ctrl+C ──► stop loops             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use boxoffice_backoffice_api::config::{AppConfig, GatewayMode};
use boxoffice_backoffice_api::{router, AppState};
use boxoffice_db::{Database, DbConfig};
use boxoffice_settlement::{HttpGateway, HttpGatewayConfig, MockGateway, PaymentGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,boxoffice=debug,sqlx=warn")),
        )
        .with_target(true)
        .init();

    info!("Starting box office back office API...");

    // Load configuration
    let config_path = std::env::var_os("BOXOFFICE_CONFIG").map(PathBuf::from);
    let config = AppConfig::load(config_path).context("Failed to load configuration")?;
    info!(
        addr = %config.server.bind_address(),
        database = %config.database.path.display(),
        gateway = ?config.gateway.mode,
        "Configuration loaded"
    );

    // Open database
    let db = Database::new(
        DbConfig::new(&config.database.path).max_connections(config.database.max_connections),
    )
    .await
    .context("Failed to open database")?;
    info!("Database ready");

    let gateway = build_gateway(&config)?;
    let addr = config.server.bind_address();
    let state = AppState::new(config, db, gateway);

    // Charges started before a restart are polled again
    match state.reconciler.resume_pending().await {
        Ok(resumed) => info!(resumed, "Pending charges resumed"),
        Err(e) => warn!(error = %e, "Could not resume pending charges"),
    }

    let reconciler = state.reconciler.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    reconciler.shutdown();
    info!("Server shutdown complete");
    Ok(())
}

fn build_gateway(config: &AppConfig) -> anyhow::Result<Arc<dyn PaymentGateway>> {
    match config.gateway.mode {
        GatewayMode::Mock => {
            warn!("Using the mock payment gateway, no card is charged");
            Ok(Arc::new(MockGateway::auto_settle_after(config.gateway.mock_settle_after)))
        }
        GatewayMode::Http => {
            let gateway = HttpGateway::new(HttpGatewayConfig {
                base_url: config.gateway_base_url()?,
                api_key: config.gateway.api_key.clone(),
                merchant_code: config.gateway.merchant_code.clone(),
                timeout: Duration::from_secs(config.gateway.timeout_secs),
                decimal_places: config.settlement.decimal_places,
            })
            .context("Failed to build gateway client")?;
            Ok(Arc::new(gateway))
        }
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown...");
}
