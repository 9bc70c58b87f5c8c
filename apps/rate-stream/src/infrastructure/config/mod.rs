//! Configuration
//!
//! Environment-driven configuration for the rate stream service.

mod settings;

pub use settings::{
    BroadcastSettings, ConfigError, FetchSettings, RateStreamConfig, RetrySettings, ServerSettings,
};
