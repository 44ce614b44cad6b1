//! Buy-signal strategies over per-symbol price history.
//!
//! One strategy configuration is active at a time. Every variant consumes
//! only the recent window for the symbol under evaluation; none of them sees
//! portfolio state or other symbols' history.

use crate::error::{EngineError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// The closed set of selectable strategies, parsed and validated from a
/// `(name, params)` configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "name", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    SmaCrossover { short: usize, long: usize },
    Bollinger { period: usize, std_dev: f64 },
    RsiMeanReversion { period: usize, oversold: f64 },
    MacdTrend { fast: usize, slow: usize, signal: usize },
    DonchianBreakout { period: usize },
}

impl Strategy {
    /// Parse a strategy configuration. Names outside the known set are
    /// rejected with `UnknownStrategy`; out-of-range parameters with
    /// `InvalidParam`. Missing parameters take their conventional defaults.
    pub fn from_config(name: &str, params: &HashMap<String, Value>) -> Result<Self> {
        let strategy = match name.to_uppercase().as_str() {
            "SMA_CROSSOVER" => {
                let short = usize_param(params, "short", 3)?;
                let long = usize_param(params, "long", 5)?;
                if short == 0 || short >= long {
                    return Err(invalid("short", "must satisfy 0 < short < long"));
                }
                Strategy::SmaCrossover { short, long }
            }
            "BOLLINGER" => {
                let period = usize_param(params, "period", 20)?;
                let std_dev = f64_param(params, "std_dev", 2.0)?;
                if period < 2 {
                    return Err(invalid("period", "must be at least 2"));
                }
                if std_dev <= 0.0 {
                    return Err(invalid("std_dev", "must be positive"));
                }
                Strategy::Bollinger { period, std_dev }
            }
            "RSI_MEAN_REVERSION" => {
                let period = usize_param(params, "period", 14)?;
                let oversold = f64_param(params, "oversold", 30.0)?;
                if period == 0 {
                    return Err(invalid("period", "must be at least 1"));
                }
                if !(0.0..=100.0).contains(&oversold) {
                    return Err(invalid("oversold", "must lie in 0..=100"));
                }
                Strategy::RsiMeanReversion { period, oversold }
            }
            "MACD_TREND" => {
                let fast = usize_param(params, "fast", 12)?;
                let slow = usize_param(params, "slow", 26)?;
                let signal = usize_param(params, "signal", 9)?;
                if fast == 0 || fast >= slow {
                    return Err(invalid("fast", "must satisfy 0 < fast < slow"));
                }
                if signal == 0 {
                    return Err(invalid("signal", "must be at least 1"));
                }
                Strategy::MacdTrend { fast, slow, signal }
            }
            "DONCHIAN_BREAKOUT" => {
                let period = usize_param(params, "period", 20)?;
                if period == 0 {
                    return Err(invalid("period", "must be at least 1"));
                }
                Strategy::DonchianBreakout { period }
            }
            other => return Err(EngineError::UnknownStrategy(other.to_string())),
        };
        Ok(strategy)
    }

    /// Display name matching the configuration vocabulary.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::SmaCrossover { .. } => "SMA_CROSSOVER",
            Strategy::Bollinger { .. } => "BOLLINGER",
            Strategy::RsiMeanReversion { .. } => "RSI_MEAN_REVERSION",
            Strategy::MacdTrend { .. } => "MACD_TREND",
            Strategy::DonchianBreakout { .. } => "DONCHIAN_BREAKOUT",
        }
    }

    /// Buy/no-buy verdict over the symbol's recent prices, oldest first.
    /// Windows shorter than the variant's minimum never signal.
    pub fn evaluate(&self, prices: &[f64]) -> bool {
        match *self {
            Strategy::SmaCrossover { short, long } => sma_crossover(prices, short, long),
            Strategy::Bollinger { period, std_dev } => bollinger_touch(prices, period, std_dev),
            Strategy::RsiMeanReversion { period, oversold } => {
                rsi(prices, period).map(|v| v < oversold).unwrap_or(false)
            }
            Strategy::MacdTrend { fast, slow, signal } => macd_cross(prices, fast, slow, signal),
            Strategy::DonchianBreakout { period } => donchian_breakout(prices, period),
        }
    }
}

fn invalid(name: &str, reason: &str) -> EngineError {
    EngineError::InvalidParam {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn f64_param(params: &HashMap<String, Value>, key: &str, default: f64) -> Result<f64> {
    match params.get(key) {
        None => Ok(default),
        Some(v) => v
            .as_f64()
            .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
            .ok_or_else(|| invalid(key, "expected a number")),
    }
}

fn usize_param(params: &HashMap<String, Value>, key: &str, default: usize) -> Result<usize> {
    let value = f64_param(params, key, default as f64)?;
    if value < 0.0 || value.fract() != 0.0 {
        return Err(invalid(key, "expected a non-negative integer"));
    }
    Ok(value as usize)
}

fn mean(prices: &[f64]) -> f64 {
    prices.iter().sum::<f64>() / prices.len() as f64
}

/// Short SMA above long SMA with the last price still rising.
fn sma_crossover(prices: &[f64], short: usize, long: usize) -> bool {
    let n = prices.len();
    if n < long {
        return false;
    }
    let short_ma = mean(&prices[n - short..]);
    let long_ma = mean(&prices[n - long..]);
    short_ma > long_ma && prices[n - 1] > prices[n - 2]
}

/// Price at or below the lower Bollinger band. Zero-variance windows never
/// signal.
fn bollinger_touch(prices: &[f64], period: usize, std_dev: f64) -> bool {
    let n = prices.len();
    if n < period {
        return false;
    }
    let window = &prices[n - period..];
    let mid = mean(window);
    let variance = window.iter().map(|p| (p - mid).powi(2)).sum::<f64>() / period as f64;
    let sd = variance.sqrt();
    if sd == 0.0 {
        return false;
    }
    prices[n - 1] <= mid - std_dev * sd
}

/// Smoothed RSI over the full window; `None` until period+1 points exist.
fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if prices.len() < period + 1 {
        return None;
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for w in prices.windows(2).take(period) {
        let change = w[1] - w[0];
        if change > 0.0 {
            gains += change;
        } else {
            losses -= change;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;
    for w in prices.windows(2).skip(period) {
        let change = w[1] - w[0];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
    }
    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// EMA values seeded with the SMA of the first `period` points; the first
/// output corresponds to `prices[period - 1]`.
fn ema_series(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut prev = mean(&prices[..period]);
    let mut out = Vec::with_capacity(prices.len() - period + 1);
    out.push(prev);
    for price in &prices[period..] {
        prev = (price - prev) * k + prev;
        out.push(prev);
    }
    out
}

/// MACD histogram crossing from non-positive to positive on the last point.
fn macd_cross(prices: &[f64], fast: usize, slow: usize, signal: usize) -> bool {
    if prices.len() < slow + signal {
        return false;
    }
    let fast_ema = ema_series(prices, fast);
    let slow_ema = ema_series(prices, slow);
    let offset = slow - fast;
    let macd: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(i, s)| fast_ema[offset + i] - s)
        .collect();
    let signal_line = ema_series(&macd, signal);
    if signal_line.len() < 2 {
        return false;
    }
    let hist = |i: usize| macd[signal - 1 + i] - signal_line[i];
    let last = signal_line.len() - 1;
    hist(last) > 0.0 && hist(last - 1) <= 0.0
}

/// Last price breaking above the highest of the preceding `period` points.
fn donchian_breakout(prices: &[f64], period: usize) -> bool {
    let n = prices.len();
    if n < period + 1 {
        return false;
    }
    let high = prices[n - 1 - period..n - 1]
        .iter()
        .fold(f64::NEG_INFINITY, |acc, p| acc.max(*p));
    prices[n - 1] > high
}
