//! Mailgun Relay Web Server - webhook receiver.
//!
//! This binary:
//! - Receives Mailgun event webhooks
//! - Verifies the HMAC signature
//! - Publishes the event to SNS, then stores it in S3
//! - Returns the handler's response

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use relay::aws::{build_sdk_config, S3Store, SnsPublisher};
use relay::web::{router, AppState};
use relay::{Config, WebhookHandler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        signing_key_configured = config.signing_key.is_some(),
        notification_service = ?config.notification_service,
        storage_service = ?config.storage_service,
        region = %config.region,
        "config_loaded"
    );

    // Missing values are reported per request, but say so up front too
    if let Err(e) = config.validate() {
        warn!(error = %e, "config_incomplete");
    }

    // Create AWS clients
    let sdk_config = build_sdk_config(&config).await;
    let sns = SnsPublisher::new(&sdk_config);
    let s3 = S3Store::new(&sdk_config, config.endpoint_url.is_some());
    info!("aws_clients_created");

    let port = config.port;
    let state = AppState::new(WebhookHandler::new(config, Arc::new(sns), Arc::new(s3)));
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
