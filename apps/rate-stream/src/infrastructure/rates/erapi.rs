//! Exchange-rate API adapter (open.er-api.com).

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::application::ports::{RateSourceError, RateSourcePort};
use crate::domain::rate::RateUpdate;
use crate::infrastructure::config::FetchSettings;

/// Rate source backed by the open.er-api.com latest-rates endpoint.
///
/// Implements the degrade-not-crash policy: a non-success HTTP status
/// yields a degraded record, not an error. Network failures and
/// unparseable bodies surface as typed errors for the broadcast loop's
/// retry path.
#[derive(Debug)]
pub struct ErApiRateSource {
    client: reqwest::Client,
    base_url: String,
    base_currency: String,
    target_currency: String,
}

impl ErApiRateSource {
    /// Create a new adapter from fetch settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(settings: &FetchSettings) -> Result<Self, RateSourceError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| RateSourceError::Build(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            base_currency: settings.base_currency.clone(),
            target_currency: settings.target_currency.clone(),
        })
    }
}

#[async_trait]
impl RateSourcePort for ErApiRateSource {
    async fn fetch(&self) -> Result<RateUpdate, RateSourceError> {
        let url = format!("{}/v6/latest/{}", self.base_url, self.base_currency);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                RateSourceError::Timeout
            } else {
                RateSourceError::Network(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            tracing::warn!(
                status = %response.status(),
                "rate endpoint returned non-success status"
            );
            return Ok(RateUpdate::degraded(self.target_currency.clone()));
        }

        let body: ErApiResponse = response
            .json()
            .await
            .map_err(|e| RateSourceError::MalformedResponse(e.to_string()))?;

        let rate = body
            .rates
            .get(&self.target_currency)
            .copied()
            .ok_or_else(|| RateSourceError::MissingCurrency(self.target_currency.clone()))?;

        Ok(RateUpdate::new(self.target_currency.clone(), Some(rate)))
    }

    fn currency(&self) -> &str {
        &self.target_currency
    }
}

// API response types

#[derive(Debug, serde::Deserialize)]
struct ErApiResponse {
    rates: HashMap<String, Decimal>,
}
