//! Trade and portfolio types.
//!
//! The ledger store owns the durable state behind these; the engine only
//! manipulates them through the ledger's transactional operations.

use serde::{Deserialize, Serialize};

/// Trade id allocated by the ledger.
pub type TradeId = i64;

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

/// Lifecycle state of a trade. Transitions only OPEN -> {CLOSED, STOPPED}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Closed,
    Stopped,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "OPEN",
            TradeStatus::Closed => "CLOSED",
            TradeStatus::Stopped => "STOPPED",
        }
    }
}

/// Why a position was closed; selects the terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    Manual,
}

impl CloseReason {
    /// Terminal status recorded for this reason.
    pub fn status(&self) -> TradeStatus {
        match self {
            CloseReason::StopLoss => TradeStatus::Stopped,
            CloseReason::TakeProfit | CloseReason::Manual => TradeStatus::Closed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CloseReason::TakeProfit => "take profit",
            CloseReason::StopLoss => "stop loss",
            CloseReason::Manual => "manual",
        }
    }
}

/// A paper trade and its lifecycle fields.
///
/// `quantity` is fixed at `trade_amount / entry_price` on creation; the exit
/// fields and `profit_loss` are written exactly once, atomically with the
/// status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub entry_price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<f64>,
    pub trade_amount: f64,
    pub fees: f64,
    pub profit_loss: f64,
    pub status: TradeStatus,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub entry_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_time: Option<i64>,
}

impl Trade {
    /// Realized profit for an exit at `exit_price`, net of fees.
    pub fn pnl_at(&self, exit_price: f64) -> f64 {
        match self.side {
            TradeSide::Buy => (exit_price - self.entry_price) * self.quantity - self.fees,
            TradeSide::Sell => (self.entry_price - exit_price) * self.quantity - self.fees,
        }
    }
}

/// Parameters for opening a trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTradeRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub entry_price: f64,
    pub trade_amount: f64,
    pub fees: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
}

/// The single authoritative balance/PnL aggregate.
///
/// Opening a trade reserves capital (`available_balance` drops, `total_balance`
/// does not); closing releases the notional plus realized pnl and moves
/// `total_balance` by the pnl alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub total_balance: f64,
    pub available_balance: f64,
    pub total_trades: i64,
    pub winning_trades: i64,
    pub losing_trades: i64,
    pub total_profit_loss: f64,
    pub last_updated: i64,
}

impl Portfolio {
    /// Capital currently reserved in open positions.
    pub fn invested(&self) -> f64 {
        self.total_balance - self.available_balance
    }

    /// Percentage of closed trades that were profitable.
    pub fn win_rate(&self) -> f64 {
        let closed = self.winning_trades + self.losing_trades;
        if closed == 0 {
            0.0
        } else {
            self.winning_trades as f64 / closed as f64 * 100.0
        }
    }
}

/// Point-in-time portfolio view handed to presentation consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub portfolio: Portfolio,
    pub open_trades_count: usize,
    pub invested_amount: f64,
    /// Most recent trades, capped at 10.
    pub recent_trades: Vec<Trade>,
    pub total_return_pct: f64,
}

/// Trade lifecycle events published on the engine's broadcast channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TradeEvent {
    Opened(Trade),
    Closed(Trade),
}
