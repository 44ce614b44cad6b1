use serde::{Deserialize, Serialize};

/// One normalized price observation for a symbol at a point in time.
///
/// Produced by the external market-data collector; the engine never sees raw
/// exchange payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    /// Last trade price.
    pub price: f64,
    /// Best bid, when the feed provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid: Option<f64>,
    /// Best ask, when the feed provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<f64>,
    /// 24h volume, when the feed provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    /// Observation time in unix milliseconds.
    pub observed_at: i64,
}

impl Tick {
    /// Build a price-only tick stamped with the current time.
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            bid: None,
            ask: None,
            volume: None,
            observed_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// One side level of an order book snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

/// A stored price observation, as returned by ledger history queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    pub timestamp: i64,
}

/// A tradable pair known to the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairInfo {
    pub symbol: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub is_active: bool,
    pub created_at: i64,
}
