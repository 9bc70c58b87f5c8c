//! Static rate source for demos and testing.

use async_trait::async_trait;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::application::ports::{RateSourceError, RateSourcePort};
use crate::domain::rate::RateUpdate;

/// Rate source that serves a fixed, settable rate.
#[derive(Debug)]
pub struct StaticRateSource {
    currency: String,
    rate: RwLock<Option<Decimal>>,
}

impl StaticRateSource {
    /// Create a new static source.
    #[must_use]
    pub fn new(currency: impl Into<String>, rate: Option<Decimal>) -> Self {
        Self {
            currency: currency.into(),
            rate: RwLock::new(rate),
        }
    }

    /// Change the served rate; `None` makes subsequent fetches degraded.
    pub fn set_rate(&self, rate: Option<Decimal>) {
        *self.rate.write() = rate;
    }
}

#[async_trait]
impl RateSourcePort for StaticRateSource {
    async fn fetch(&self) -> Result<RateUpdate, RateSourceError> {
        Ok(RateUpdate::new(self.currency.clone(), *self.rate.read()))
    }

    fn currency(&self) -> &str {
        &self.currency
    }
}
