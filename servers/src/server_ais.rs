//! # AIS Stream Proxy Server
//!
//! HTTP front for the maritime dashboard's live vessel feed. Browsers cannot hold
//! the AIS Stream API key, so they ask this server to open relay sockets on their
//! behalf and then poll it for what arrived.
//!
//! ## Core Responsibilities:
//! - **Action endpoint:** `POST /api/maritime/ais-stream` (`connect`, `disconnect`,
//!   `updateSubscription`, `getStatus`).
//! - **Dashboard status:** `GET /api/maritime/status`, aggregated from the live registry.
//! - **Health:** `GET /health`.
//! - **Lifecycle:** on Ctrl-C or SIGTERM the server stops accepting requests, then
//!   closes every relay socket it still holds.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use lib_ais::{router, ConnectionRegistry, RequestDispatcher};

mod ais_logic;
use ais_logic::{config, logger};

/// # Main Entry Point
///
/// ## Execution Flow:
/// 1.  **Environment & Crypto**: loads `.env` and installs the `ring` provider for rustls.
/// 2.  **Configuration & Logging**: resolves settings, then starts the fern logger.
/// 3.  **Core Services**: builds the registry and the dispatcher around it.
/// 4.  **HTTP**: serves the router until a shutdown signal arrives.
/// 5.  **Teardown**: closes every relay socket still registered.
#[tokio::main]
async fn main() -> Result<()> {
    // --- Phase 1: Environment & Crypto ---
    dotenvy::dotenv().ok();
    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    // --- Phase 2: Configuration & Logging ---
    let settings = config::load_config()?;
    logger::setup_logging(&settings.log_dir, &settings.log_level)?;
    log::info!(
        "AIS proxy starting: relay={} buffer={} window={}",
        settings.stream.ws_url,
        settings.stream.buffer_capacity,
        settings.stream.status_window
    );

    // --- Phase 3: Core Services ---
    let registry = Arc::new(ConnectionRegistry::new(settings.stream.clone()));
    let dispatcher = Arc::new(RequestDispatcher::new(registry));

    // --- Phase 4: HTTP ---
    let mut app = router(Arc::clone(&dispatcher));
    if settings.cors_allow_any {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Phase 5: Teardown ---
    dispatcher.shutdown().await;
    log::info!("Shutdown complete.");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    // Handler for CTRL+C
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    // Handler for SIGTERM (on UNIX systems)
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Ctrl-C received, initiating shutdown."),
        _ = terminate => log::info!("SIGTERM received, initiating shutdown."),
    }
}
