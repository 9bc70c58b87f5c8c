//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `broadcaster`: the periodic fetch-and-fan-out loop
//! - `retry`: bounded backoff policy for within-tick fetch retries

pub mod broadcaster;
pub mod retry;

pub use broadcaster::{BroadcastHealth, Broadcaster, BroadcasterConfig};
pub use retry::{RetryConfig, RetryPolicy};
