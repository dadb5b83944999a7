use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One venue's latest observation for an instrument.
///
/// Funding rates are kept in the venue's own convention; nothing here rescales them to a
/// common funding period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueSnapshot {
    pub funding_rate: f64,
    pub mark_price: Option<f64>,
    /// Oracle price on Hyperliquid, index price on Lighter.
    pub index_price: Option<f64>,
    pub open_interest: Option<f64>,
    /// Running estimate for the funding period in progress, where the venue reports one.
    pub current_funding_rate: Option<f64>,
    /// Funding timestamp reported alongside `funding_rate`.
    pub funding_timestamp: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
}

impl VenueSnapshot {
    /// A snapshot carrying only a funding rate, observed now.
    pub fn with_funding_rate(funding_rate: f64) -> Self {
        Self {
            funding_rate,
            mark_price: None,
            index_price: None,
            open_interest: None,
            current_funding_rate: None,
            funding_timestamp: None,
            observed_at: Utc::now(),
        }
    }
}
