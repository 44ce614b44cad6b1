//! Bounded per-symbol price history for signal evaluation.

use dashmap::DashMap;
use std::collections::VecDeque;

/// Rolling window of recent prices per symbol.
///
/// Strategy evaluation only ever needs the most recent `capacity` points;
/// everything older lives in the ledger, not here. Different symbols update
/// fully in parallel.
pub struct PriceHistory {
    prices: DashMap<String, VecDeque<f64>>,
    capacity: usize,
}

impl PriceHistory {
    /// Create a history retaining up to `capacity` points per symbol.
    pub fn new(capacity: usize) -> Self {
        Self {
            prices: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a price for a symbol, evicting the oldest point past capacity.
    pub fn push(&self, symbol: &str, price: f64) {
        let mut entry = self.prices.entry(symbol.to_string()).or_default();
        let window = entry.value_mut();
        window.push_back(price);
        while window.len() > self.capacity {
            window.pop_front();
        }
    }

    /// Copy of the symbol's window, oldest first.
    pub fn snapshot(&self, symbol: &str) -> Vec<f64> {
        self.prices
            .get(symbol)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Most recent price for a symbol, if any.
    pub fn latest(&self, symbol: &str) -> Option<f64> {
        self.prices.get(symbol).and_then(|w| w.back().copied())
    }

    /// Number of retained points for a symbol.
    pub fn len(&self, symbol: &str) -> usize {
        self.prices.get(symbol).map(|w| w.len()).unwrap_or(0)
    }
}
