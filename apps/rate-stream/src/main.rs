//! Rate Stream Binary
//!
//! Starts the currency rate broadcaster.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin rate-stream
//! ```
//!
//! # Environment Variables
//!
//! All optional:
//! - `RATE_STREAM_PORT`: HTTP/WebSocket port (default: 8000)
//! - `RATE_STREAM_ALLOWED_ORIGIN`: CORS origin (default: <http://localhost:3000>)
//! - `RATE_STREAM_API_BASE_URL`: Rate API base URL (default: <https://open.er-api.com>)
//! - `RATE_STREAM_BASE_CURRENCY`: Currency rates are quoted against (default: USD)
//! - `RATE_STREAM_TARGET_CURRENCY`: Currency code to broadcast (default: BYN)
//! - `RATE_STREAM_POLL_INTERVAL_MS`: Fetch interval (default: 2000)
//! - `RATE_STREAM_FETCH_TIMEOUT_MS`: Upstream request timeout (default: 5000)
//! - `RATE_STREAM_SEND_TIMEOUT_MS`: Per-subscriber send timeout (default: 1000)
//! - `RATE_STREAM_OUTBOUND_CAPACITY`: Per-subscriber queue capacity (default: 32)
//! - `RATE_STREAM_FETCH_RETRY_MAX_ATTEMPTS`: Within-tick retries (default: 2)
//! - `RATE_STREAM_FETCH_RETRY_DELAY_INITIAL_MS`: First retry delay (default: 200)
//! - `RATE_STREAM_FETCH_RETRY_DELAY_MAX_MS`: Retry delay cap (default: 1000)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Instant;

use rate_stream::{
    AppState, BroadcastHealth, Broadcaster, BroadcasterConfig, ErApiRateSource, HttpServer,
    RateSourcePort, RateStreamConfig, SubscriberRegistry, init_metrics, telemetry,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    telemetry::init();

    tracing::info!("Starting Rate Stream");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = RateStreamConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let registry = Arc::new(SubscriberRegistry::new());
    let health = Arc::new(BroadcastHealth::new());

    let source: Arc<dyn RateSourcePort> = Arc::new(ErApiRateSource::new(&config.fetch)?);

    let broadcaster = Broadcaster::new(
        source,
        Arc::clone(&registry),
        Arc::clone(&health),
        BroadcasterConfig::from(&config),
        shutdown_token.clone(),
    );

    let state = AppState {
        registry,
        health,
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: Instant::now(),
        poll_interval: config.broadcast.poll_interval,
        outbound_capacity: config.broadcast.outbound_capacity,
        shutdown: shutdown_token.clone(),
    };
    let server = HttpServer::new(config.server.clone(), state, shutdown_token.clone());

    // Spawn the broadcast loop
    tokio::spawn(broadcaster.run());

    // Spawn the HTTP server
    tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("Rate stream ready");

    await_shutdown(shutdown_token).await;

    tracing::info!("Rate stream stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &RateStreamConfig) {
    tracing::info!(
        port = config.server.port,
        base_currency = %config.fetch.base_currency,
        target_currency = %config.fetch.target_currency,
        poll_interval_ms = config.broadcast.poll_interval.as_millis(),
        "Configuration loaded"
    );
    tracing::debug!(
        api_base_url = %config.fetch.base_url,
        allowed_origin = %config.server.allowed_origin,
        "Upstream endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
