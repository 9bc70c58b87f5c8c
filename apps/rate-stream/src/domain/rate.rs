//! Rate Update Records
//!
//! The immutable record produced once per fetch tick and broadcast to
//! every connected subscriber.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One currency rate observation.
///
/// Serializes to the wire format delivered to subscribers:
///
/// ```json
/// {"time": "2024-01-15T10:30:00Z", "currency": "BYN", "rate": 3.27}
/// ```
///
/// A `null` rate marks a degraded record: the upstream source was
/// unavailable for this tick but the pipeline kept running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateUpdate {
    /// Observation timestamp.
    pub time: DateTime<Utc>,
    /// ISO 4217 code of the quoted currency.
    pub currency: String,
    /// Rate against the base currency; `None` when the fetch degraded.
    #[serde(with = "rust_decimal::serde::float_option")]
    pub rate: Option<Decimal>,
}

impl RateUpdate {
    /// Create an update stamped with the current time.
    #[must_use]
    pub fn new(currency: impl Into<String>, rate: Option<Decimal>) -> Self {
        Self {
            time: Utc::now(),
            currency: currency.into(),
            rate,
        }
    }

    /// Create a degraded (null-rate) update stamped with the current time.
    #[must_use]
    pub fn degraded(currency: impl Into<String>) -> Self {
        Self::new(currency, None)
    }

    /// Whether this update carries no rate.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.rate.is_none()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::TimeZone;

    use super::*;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
    }

    #[test]
    fn serializes_to_wire_format() {
        let update = RateUpdate {
            time: fixed_time(),
            currency: "BYN".to_string(),
            rate: Some(Decimal::from_str("3.27").unwrap()),
        };

        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(
            json,
            r#"{"time":"2024-01-15T10:30:00Z","currency":"BYN","rate":3.27}"#
        );
    }

    #[test]
    fn degraded_serializes_rate_as_null() {
        let update = RateUpdate {
            time: fixed_time(),
            currency: "BYN".to_string(),
            rate: None,
        };

        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(
            json,
            r#"{"time":"2024-01-15T10:30:00Z","currency":"BYN","rate":null}"#
        );
    }

    #[test]
    fn degraded_constructor() {
        let update = RateUpdate::degraded("BYN");
        assert!(update.is_degraded());
        assert_eq!(update.currency, "BYN");
    }

    #[test]
    fn numeric_rate_deserializes() {
        let update: RateUpdate =
            serde_json::from_str(r#"{"time":"2024-01-15T10:30:00Z","currency":"BYN","rate":3.27}"#)
                .unwrap();
        assert_eq!(update.rate, Some(Decimal::from_str("3.27").unwrap()));
        assert!(!update.is_degraded());
    }
}
