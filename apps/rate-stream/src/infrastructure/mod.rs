//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port
//! interfaces defined in the application layer.

/// Configuration loaded from environment variables.
pub mod config;

/// Health check HTTP handlers.
pub mod health;

/// HTTP server, demo page, and WebSocket endpoint.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Upstream rate provider adapters.
pub mod rates;

/// Tracing initialization.
pub mod telemetry;
