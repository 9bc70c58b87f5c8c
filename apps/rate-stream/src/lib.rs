#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Rate Stream - Currency Rate Broadcaster
//!
//! A WebSocket service that polls an exchange-rate API on a fixed
//! interval and fans each update out to every connected subscriber.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core broadcast types
//!   - `rate`: The per-tick rate update record
//!   - `registry`: Subscriber tracking and the delivery seam
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interface for the polled rate provider
//!   - `services`: The broadcast loop and its fetch retry policy
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `rates`: HTTP adapter for the exchange-rate API
//!   - `http`: axum server, demo page, WebSocket endpoint
//!   - `health`: Health check and metrics handlers
//!   - `config`: Environment-driven configuration
//!
//! # Data Flow
//!
//! ```text
//!                  ┌─────────────┐     ┌─────────────┐
//! Rate API ──GET──▶│  Broadcast  │────▶│  WebSocket  │──▶ Subscriber 1
//!  (per tick)      │    Loop     │     │   Server    │──▶ Subscriber 2
//!                  └─────────────┘     └─────────────┘──▶ Subscriber N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core broadcast types with no transport dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::rate::RateUpdate;
pub use domain::registry::{
    SinkError, SubscriberId, SubscriberRegistry, SubscriberSink, next_subscriber_id,
};

// Application ports and services
pub use application::ports::{RateSourceError, RateSourcePort};
pub use application::services::{
    BroadcastHealth, Broadcaster, BroadcasterConfig, RetryConfig, RetryPolicy,
};

// Infrastructure config
pub use infrastructure::config::{
    BroadcastSettings, ConfigError, FetchSettings, RateStreamConfig, RetrySettings, ServerSettings,
};

// HTTP server (router exposed for integration tests)
pub use infrastructure::http::{AppState, HttpServer, ServerError, router};

// Rate source adapters
pub use infrastructure::rates::{ErApiRateSource, StaticRateSource};

// Health types
pub use infrastructure::health::{BroadcastStatus, HealthResponse, HealthStatus, SubscriberStatus};

// Metrics
pub use infrastructure::metrics::{get_metrics_handle, init_metrics};

// Telemetry
pub use infrastructure::telemetry;
