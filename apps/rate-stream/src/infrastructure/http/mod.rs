//! HTTP Server
//!
//! The service's single HTTP surface: the demo page at `/`, the
//! WebSocket endpoint at `/ws/currency`, and the health/metrics routes.

pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::http::HeaderValue;
use axum::response::Html;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowHeaders, AllowMethods, CorsLayer};

use crate::application::services::broadcaster::BroadcastHealth;
use crate::domain::registry::SubscriberRegistry;
use crate::infrastructure::config::ServerSettings;
use crate::infrastructure::health;

// =============================================================================
// Shared State
// =============================================================================

/// Shared state for HTTP handlers and connection tasks.
#[derive(Clone)]
pub struct AppState {
    /// Active subscriber registry.
    pub registry: Arc<SubscriberRegistry>,
    /// Broadcast loop health.
    pub health: Arc<BroadcastHealth>,
    /// Service version reported by the health endpoint.
    pub version: String,
    /// Process start time.
    pub started_at: Instant,
    /// Broadcast poll interval, used to judge tick staleness.
    pub poll_interval: Duration,
    /// Capacity of each subscriber's outbound queue.
    pub outbound_capacity: usize,
    /// Shutdown signal propagated to connection tasks.
    pub shutdown: CancellationToken,
}

// =============================================================================
// Router
// =============================================================================

/// Build the service router (without the CORS layer).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .merge(ws::routes())
        .merge(health::routes())
        .with_state(state)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
    <head>
        <title>Live Currency Rates</title>
    </head>
    <body>
        <h1>WebSocket Currency Rates</h1>
        <ul id='messages'>
        </ul>
        <script>
            var ws = new WebSocket("ws://" + location.host + "/ws/currency");
            ws.onmessage = function(event) {
                var messages = document.getElementById('messages');
                var message = document.createElement('li');
                var content = document.createTextNode(event.data);
                message.appendChild(content);
                messages.appendChild(message);
            };
        </script>
    </body>
</html>
"#;

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// =============================================================================
// Server
// =============================================================================

/// The service HTTP server.
pub struct HttpServer {
    settings: ServerSettings,
    state: AppState,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server.
    #[must_use]
    pub const fn new(settings: ServerSettings, state: AppState, cancel: CancellationToken) -> Self {
        Self {
            settings,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if the allowed origin is invalid, binding
    /// fails, or the HTTP server encounters a fatal error while running.
    pub async fn run(self) -> Result<(), ServerError> {
        let origin = self
            .settings
            .allowed_origin
            .parse::<HeaderValue>()
            .map_err(|_| ServerError::InvalidOrigin(self.settings.allowed_origin.clone()))?;

        let cors = CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true);

        let app = router(self.state).layer(cors);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.settings.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.settings.port, e.to_string()))?;

        tracing::info!(port = self.settings.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configured allowed origin is not a valid header value.
    #[error("invalid allowed origin: {0}")]
    InvalidOrigin(String),

    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
