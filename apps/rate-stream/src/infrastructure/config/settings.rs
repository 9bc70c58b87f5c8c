//! Service Configuration Settings
//!
//! Configuration types for the rate stream service, loaded from
//! environment variables with sensible defaults throughout.

use std::time::Duration;

use crate::application::services::broadcaster::BroadcasterConfig;
use crate::application::services::retry::RetryConfig;

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Port the HTTP/WebSocket server listens on.
    pub port: u16,
    /// Origin allowed to call the service from a browser.
    pub allowed_origin: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8000,
            allowed_origin: "http://localhost:3000".to_string(),
        }
    }
}

/// Upstream fetch retry settings.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Delay before the first within-tick retry.
    pub delay_initial: Duration,
    /// Maximum delay between retries.
    pub delay_max: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// Maximum retries per tick (0 = no retries).
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            delay_initial: Duration::from_millis(200),
            delay_max: Duration::from_secs(1),
            multiplier: 2.0,
            max_attempts: 2,
        }
    }
}

/// Upstream rate provider settings.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Base URL of the exchange-rate API.
    pub base_url: String,
    /// Currency the rates are quoted against.
    pub base_currency: String,
    /// Currency code extracted from each response.
    pub target_currency: String,
    /// Upper bound on a single HTTP request.
    pub request_timeout: Duration,
    /// Within-tick retry behavior.
    pub retry: RetrySettings,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            base_url: "https://open.er-api.com".to_string(),
            base_currency: "USD".to_string(),
            target_currency: "BYN".to_string(),
            request_timeout: Duration::from_secs(5),
            retry: RetrySettings::default(),
        }
    }
}

/// Broadcast loop settings.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Interval between fetch ticks.
    pub poll_interval: Duration,
    /// Upper bound on delivery to a single subscriber.
    pub send_timeout: Duration,
    /// Capacity of each subscriber's outbound queue.
    pub outbound_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            send_timeout: Duration::from_secs(1),
            outbound_capacity: 32,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default)]
pub struct RateStreamConfig {
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Upstream rate provider settings.
    pub fetch: FetchSettings,
    /// Broadcast loop settings.
    pub broadcast: BroadcastSettings,
}

impl RateStreamConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a currency code is set to an empty value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let server = ServerSettings {
            port: parse_env_u16("RATE_STREAM_PORT", ServerSettings::default().port),
            allowed_origin: parse_env_string(
                "RATE_STREAM_ALLOWED_ORIGIN",
                &ServerSettings::default().allowed_origin,
            ),
        };

        let fetch_defaults = FetchSettings::default();
        let fetch = FetchSettings {
            base_url: parse_env_string("RATE_STREAM_API_BASE_URL", &fetch_defaults.base_url),
            base_currency: parse_env_string(
                "RATE_STREAM_BASE_CURRENCY",
                &fetch_defaults.base_currency,
            ),
            target_currency: parse_env_string(
                "RATE_STREAM_TARGET_CURRENCY",
                &fetch_defaults.target_currency,
            ),
            request_timeout: parse_env_duration_millis(
                "RATE_STREAM_FETCH_TIMEOUT_MS",
                fetch_defaults.request_timeout,
            ),
            retry: RetrySettings {
                delay_initial: parse_env_duration_millis(
                    "RATE_STREAM_FETCH_RETRY_DELAY_INITIAL_MS",
                    RetrySettings::default().delay_initial,
                ),
                delay_max: parse_env_duration_millis(
                    "RATE_STREAM_FETCH_RETRY_DELAY_MAX_MS",
                    RetrySettings::default().delay_max,
                ),
                multiplier: parse_env_f64(
                    "RATE_STREAM_FETCH_RETRY_MULTIPLIER",
                    RetrySettings::default().multiplier,
                ),
                max_attempts: parse_env_u32(
                    "RATE_STREAM_FETCH_RETRY_MAX_ATTEMPTS",
                    RetrySettings::default().max_attempts,
                ),
            },
        };

        if fetch.base_currency.is_empty() {
            return Err(ConfigError::EmptyValue(
                "RATE_STREAM_BASE_CURRENCY".to_string(),
            ));
        }
        if fetch.target_currency.is_empty() {
            return Err(ConfigError::EmptyValue(
                "RATE_STREAM_TARGET_CURRENCY".to_string(),
            ));
        }

        let broadcast_defaults = BroadcastSettings::default();
        let broadcast = BroadcastSettings {
            poll_interval: parse_env_duration_millis(
                "RATE_STREAM_POLL_INTERVAL_MS",
                broadcast_defaults.poll_interval,
            ),
            send_timeout: parse_env_duration_millis(
                "RATE_STREAM_SEND_TIMEOUT_MS",
                broadcast_defaults.send_timeout,
            ),
            outbound_capacity: parse_env_usize(
                "RATE_STREAM_OUTBOUND_CAPACITY",
                broadcast_defaults.outbound_capacity,
            )
            .max(1),
        };

        Ok(Self {
            server,
            fetch,
            broadcast,
        })
    }
}

impl From<&RateStreamConfig> for BroadcasterConfig {
    fn from(config: &RateStreamConfig) -> Self {
        Self {
            poll_interval: config.broadcast.poll_interval,
            // Backstop a little above the HTTP client's own timeout
            fetch_timeout: config
                .fetch
                .request_timeout
                .saturating_add(Duration::from_secs(1)),
            send_timeout: config.broadcast.send_timeout,
            retry: RetryConfig::from(&config.fetch.retry),
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            initial_delay: settings.delay_initial,
            max_delay: settings.delay_max,
            multiplier: settings.multiplier,
            jitter_factor: 0.1, // Default jitter
            max_attempts: settings.max_attempts,
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has an empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
