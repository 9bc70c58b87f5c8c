//! Port Interfaces
//!
//! Interfaces for external systems following the Hexagonal Architecture
//! pattern. Infrastructure adapters implement these contracts.

use async_trait::async_trait;

use crate::domain::rate::RateUpdate;

/// Errors from the upstream rate provider.
#[derive(Debug, thiserror::Error)]
pub enum RateSourceError {
    /// The underlying HTTP client could not be constructed.
    #[error("failed to build rate source client: {0}")]
    Build(String),

    /// Network-level failure reaching the endpoint.
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded its bounded timeout.
    #[error("rate fetch timed out")]
    Timeout,

    /// The response body could not be parsed.
    #[error("malformed response body: {0}")]
    MalformedResponse(String),

    /// The response parsed but does not contain the target currency.
    #[error("currency {0} missing from response")]
    MissingCurrency(String),
}

/// Port for the polled rate provider.
///
/// A fetch never blocks beyond a bounded timeout. A non-success response
/// from the provider is not an error: adapters return a degraded record
/// (`rate: null`) so a flaky upstream degrades the output instead of
/// failing the tick. Harder failures (network, unparseable body) surface
/// as `RateSourceError` and are absorbed by the broadcast loop's
/// retry-then-degrade path.
#[async_trait]
pub trait RateSourcePort: Send + Sync {
    /// Fetch the current rate for the target currency.
    async fn fetch(&self) -> Result<RateUpdate, RateSourceError>;

    /// ISO 4217 code of the currency this source quotes.
    fn currency(&self) -> &str;
}
