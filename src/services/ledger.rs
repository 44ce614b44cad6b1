//! The abstract ledger store the engine trades against.

use crate::error::Result;
use crate::types::{
    CloseReason, OpenTradeRequest, PairInfo, Portfolio, PriceLevel, PricePoint, Tick, Trade,
    TradeId,
};

/// Durable record of pairs, price ticks, trades and the portfolio aggregate.
///
/// Implementations must serialize all trade/portfolio mutations: `open_trade`
/// and `close_trade` each mutate the trade and the portfolio aggregate as one
/// atomic unit, and a close only succeeds while the trade is still OPEN.
pub trait Ledger: Send + Sync {
    /// Persist one price observation.
    fn record_tick(&self, tick: &Tick) -> Result<()>;

    /// Persist an order book snapshot.
    fn record_order_book(&self, symbol: &str, bids: &[PriceLevel], asks: &[PriceLevel])
        -> Result<()>;

    /// Register a tradable pair; already-known symbols are left untouched.
    fn add_pair(&self, symbol: &str, base_currency: &str, quote_currency: &str) -> Result<()>;

    /// All active USD-quoted pairs, ordered by symbol.
    fn get_usd_pairs(&self) -> Result<Vec<PairInfo>>;

    /// Most recent recorded price for a symbol.
    fn get_latest_price(&self, symbol: &str) -> Result<Option<f64>>;

    /// Recent price observations for a symbol, oldest first.
    fn get_price_history(&self, symbol: &str, limit: usize) -> Result<Vec<PricePoint>>;

    /// Open a trade, reserving `trade_amount + fees` from the available
    /// balance and bumping the trade counter in the same transaction.
    fn open_trade(&self, req: &OpenTradeRequest) -> Result<TradeId>;

    /// Close a trade if it is still OPEN.
    ///
    /// Returns `Ok(false)` when the trade does not exist or was already
    /// closed by a concurrent caller; that outcome is an expected race, not
    /// an error. On success the exit fields, realized pnl and portfolio
    /// aggregates are written atomically.
    fn close_trade(
        &self,
        trade_id: TradeId,
        exit_price: f64,
        exit_time: i64,
        reason: CloseReason,
    ) -> Result<bool>;

    /// All OPEN trades, most recent first.
    fn get_open_trades(&self) -> Result<Vec<Trade>>;

    /// OPEN trades for one symbol, most recent first.
    fn get_open_trades_for_symbol(&self, symbol: &str) -> Result<Vec<Trade>>;

    /// Trade history across all statuses, most recent first.
    fn get_trade_history(&self, limit: usize) -> Result<Vec<Trade>>;

    /// The portfolio aggregate.
    fn get_portfolio(&self) -> Result<Portfolio>;

    /// Total number of trades ever recorded.
    fn count_trades(&self) -> Result<u64>;

    /// Total number of stored price observations.
    fn count_price_records(&self) -> Result<u64>;

    /// Delete all trades and zero the portfolio counters; balances are left
    /// as they stand.
    fn clear_trades(&self) -> Result<()>;

    /// Delete all trades, prices and order book data and restore the
    /// portfolio to its starting balance.
    fn reset_all(&self) -> Result<()>;
}
