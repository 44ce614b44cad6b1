//! papertrade - paper trading engine over a live market-data stream.
//!
//! Ticks flow in from an external market-data collector; the engine
//! evaluates the active strategy per symbol, opens risk-bounded BUY
//! positions, monitors stop-loss/take-profit thresholds and keeps the
//! portfolio aggregate consistent through a transactional ledger.

pub mod config;
pub mod error;
pub mod services;
pub mod symbol;
pub mod types;

// Re-export commonly used types
pub use config::{Config, TradeSettings};
pub use error::{EngineError, Result};
pub use services::{Ledger, MarketHandler, PriceHistory, SqliteLedger, Strategy, TradingEngine};
pub use types::*;
