//! Tracing Initialization
//!
//! Configures the tracing subscriber for structured logging.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Log filter (default: info)
//!
//! # Usage
//!
//! ```ignore
//! rate_stream::telemetry::init();
//! tracing::info!("service started");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the tracing subscriber.
///
/// Reads the filter from `RUST_LOG`, defaulting to `info`. Calling this
/// more than once (e.g. across tests) is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
