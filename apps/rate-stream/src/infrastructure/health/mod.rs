//! Health Check and Metrics Endpoint
//!
//! HTTP handlers for health checks, broadcast-loop status reporting,
//! and Prometheus metrics. Used by container orchestrators, load
//! balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (checks the loop)
//! - `GET /metrics` - Prometheus metrics in text format

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::infrastructure::http::AppState;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Broadcast loop status.
    pub broadcast: BroadcastStatus,
    /// Active subscriber information.
    pub subscribers: SubscriberStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The loop is ticking and the upstream source is serving rates.
    Healthy,
    /// The loop is ticking but the last tick(s) degraded.
    Degraded,
    /// The loop has not completed a tick recently (or ever).
    Unhealthy,
}

/// Broadcast loop status.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastStatus {
    /// Whether the loop completed a tick recently.
    pub ticking: bool,
    /// Ticks completed since startup.
    pub ticks: u64,
    /// Timestamp of the last completed tick.
    pub last_tick_at: Option<DateTime<Utc>>,
    /// Consecutive ticks that produced a degraded record.
    pub consecutive_degraded: u32,
    /// Most recent fetch failure, if any since the last clean tick.
    pub last_error: Option<String>,
}

/// Active subscriber information.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberStatus {
    /// Total active WebSocket subscribers.
    pub total: usize,
}

// =============================================================================
// Routes
// =============================================================================

/// Health and metrics routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ticking = state
        .health
        .is_ticking(staleness_threshold(state.poll_interval));

    if ticking {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

// =============================================================================
// Status Derivation
// =============================================================================

/// A loop that has not ticked within three poll intervals is considered
/// dead. Also covers startup, before the first tick has completed.
fn staleness_threshold(poll_interval: Duration) -> Duration {
    poll_interval * 3
}

fn build_health_response(state: &AppState) -> HealthResponse {
    let ticking = state
        .health
        .is_ticking(staleness_threshold(state.poll_interval));
    let consecutive_degraded = state.health.consecutive_degraded();

    HealthResponse {
        status: determine_health_status(ticking, consecutive_degraded),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        broadcast: BroadcastStatus {
            ticking,
            ticks: state.health.ticks(),
            last_tick_at: state.health.last_tick_at(),
            consecutive_degraded,
            last_error: state.health.last_error(),
        },
        subscribers: SubscriberStatus {
            total: state.registry.len(),
        },
    }
}

const fn determine_health_status(ticking: bool, consecutive_degraded: u32) -> HealthStatus {
    if !ticking {
        HealthStatus::Unhealthy
    } else if consecutive_degraded > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

// =============================================================================
// Tests
// =============================================================================
