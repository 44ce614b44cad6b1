//! Trading engine orchestration.
//!
//! Routes each incoming tick through persistence, entry evaluation and exit
//! monitoring, and owns the run state and the active strategy. All
//! trade/portfolio mutations go through the ledger; failures are isolated to
//! the symbol and cycle that hit them and never stop the engine.

use crate::config::TradeSettings;
use crate::error::Result;
use crate::services::{Ledger, PriceHistory, Strategy};
use crate::types::{
    CloseReason, OpenTradeRequest, PerformanceSnapshot, PriceLevel, Tick, Trade, TradeEvent,
    TradeId, TradeSide,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Capability interface the market-data collector drives.
///
/// Registered once at startup; the collector never learns anything about the
/// engine beyond these two entry points.
pub trait MarketHandler: Send + Sync {
    /// Deliver one normalized price tick.
    fn on_tick(&self, tick: &Tick);
    /// Deliver one order book snapshot.
    fn on_order_book(&self, symbol: &str, bids: &[PriceLevel], asks: &[PriceLevel]);
}

/// Paper trading engine.
pub struct TradingEngine {
    ledger: Arc<dyn Ledger>,
    history: PriceHistory,
    settings: TradeSettings,
    strategy: RwLock<Option<Strategy>>,
    /// Run flag. Tick evaluation holds the read half across the decision
    /// path, so `stop()` (write half) returns only once no in-flight
    /// evaluation can still open a trade. Reads never block each other, so
    /// ticks for different symbols stay parallel.
    running: RwLock<bool>,
    events: broadcast::Sender<TradeEvent>,
}

impl TradingEngine {
    /// Create an engine over the given ledger.
    pub fn new(ledger: Arc<dyn Ledger>, settings: TradeSettings) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            ledger,
            history: PriceHistory::new(settings.max_history),
            settings,
            strategy: RwLock::new(None),
            running: RwLock::new(false),
            events,
        })
    }

    /// Subscribe to trade lifecycle events.
    pub fn subscribe_trades(&self) -> broadcast::Receiver<TradeEvent> {
        self.events.subscribe()
    }

    /// Replace the active strategy. Takes effect on the next tick; a tick
    /// already past admission keeps the strategy it saw.
    pub fn configure_strategy(&self, name: &str, params: &HashMap<String, Value>) -> Result<()> {
        let strategy = Strategy::from_config(name, params)?;
        info!("Configured strategy {}", strategy.name());
        *self.strategy.write().unwrap() = Some(strategy);
        Ok(())
    }

    /// Currently active strategy, if any.
    pub fn current_strategy(&self) -> Option<Strategy> {
        self.strategy.read().unwrap().clone()
    }

    /// Begin opening and closing trades. No-op when already running.
    pub fn start(&self) {
        let mut running = self.running.write().unwrap();
        if *running {
            return;
        }
        *running = true;
        info!("Trading engine started");
    }

    /// Stop trading. Once this returns no new trade will open; ticks keep
    /// being persisted and accumulated into history.
    pub fn stop(&self) {
        let mut running = self.running.write().unwrap();
        if !*running {
            return;
        }
        *running = false;
        info!("Trading engine stopped");
    }

    /// Whether the engine is accepting trade decisions.
    pub fn is_running(&self) -> bool {
        *self.running.read().unwrap()
    }

    /// Process one tick: persist it, then (when running) evaluate the entry
    /// signal and the exit thresholds for the tick's symbol. A persistence
    /// failure aborts this symbol's cycle; evaluation failures are logged and
    /// skip only that step. No failure stops the engine.
    pub fn on_tick(&self, tick: &Tick) {
        self.history.push(&tick.symbol, tick.price);
        if let Err(e) = self.ledger.record_tick(tick) {
            error!("Failed to persist tick for {}: {}", tick.symbol, e);
            return;
        }

        let running = self.running.read().unwrap();
        if !*running {
            return;
        }

        if let Err(e) = self.check_entry(tick) {
            error!("Entry evaluation failed for {}: {}", tick.symbol, e);
        }
        if let Err(e) = self.monitor_positions(&tick.symbol, tick.price) {
            error!("Position monitoring failed for {}: {}", tick.symbol, e);
        }
    }

    /// Drive the engine from a tick channel until the sender side closes.
    /// Stopping the engine does not stop consumption; it only suppresses
    /// trading.
    pub async fn run(&self, mut ticks: mpsc::Receiver<Tick>) {
        info!("Tick feed attached");
        while let Some(tick) = ticks.recv().await {
            self.on_tick(&tick);
        }
        info!("Tick feed closed");
    }

    /// Evaluate the buy signal and open a trade when the balance allows it.
    fn check_entry(&self, tick: &Tick) -> Result<()> {
        let Some(strategy) = self.current_strategy() else {
            // Unconfigured: never trade.
            return Ok(());
        };

        let cost =
            self.settings.trade_amount + self.settings.trade_amount * self.settings.maker_fee;
        let portfolio = self.ledger.get_portfolio()?;
        if portfolio.available_balance < cost {
            debug!(
                "Skipping {}: available {:.2} below trade cost {:.2}",
                tick.symbol, portfolio.available_balance, cost
            );
            return Ok(());
        }

        if !strategy.evaluate(&self.history.snapshot(&tick.symbol)) {
            return Ok(());
        }

        let trade_id = self.open_buy(tick)?;
        info!(
            "Opened BUY #{} on {}: {:.2} at {:.4}",
            trade_id, tick.symbol, self.settings.trade_amount, tick.price
        );
        Ok(())
    }

    fn open_buy(&self, tick: &Tick) -> Result<TradeId> {
        let entry_price = tick.price;
        let request = OpenTradeRequest {
            symbol: tick.symbol.clone(),
            side: TradeSide::Buy,
            quantity: self.settings.trade_amount / entry_price,
            entry_price,
            trade_amount: self.settings.trade_amount,
            fees: self.settings.trade_amount * self.settings.maker_fee,
            stop_loss_price: entry_price * (1.0 - self.settings.stop_loss),
            take_profit_price: entry_price * (1.0 + self.settings.profit_margin),
        };
        let trade_id = self.ledger.open_trade(&request)?;

        match self.ledger.get_open_trades_for_symbol(&request.symbol) {
            Ok(trades) => {
                if let Some(trade) = trades.into_iter().find(|t| t.id == trade_id) {
                    let _ = self.events.send(TradeEvent::Opened(trade));
                }
            }
            Err(e) => debug!("Could not load trade #{} for broadcast: {}", trade_id, e),
        }
        Ok(trade_id)
    }

    /// Check every OPEN trade on the symbol against its exit thresholds.
    /// Take-profit wins when both thresholds trigger on the same tick.
    fn monitor_positions(&self, symbol: &str, current_price: f64) -> Result<()> {
        let open_trades = self.ledger.get_open_trades_for_symbol(symbol)?;
        for trade in open_trades {
            let reason = if current_price >= trade.take_profit_price {
                CloseReason::TakeProfit
            } else if current_price <= trade.stop_loss_price {
                CloseReason::StopLoss
            } else {
                continue;
            };
            if let Err(e) = self.close_position(&trade, current_price, reason) {
                error!("Failed to close trade #{} on {}: {}", trade.id, symbol, e);
            }
        }
        Ok(())
    }

    /// Close one position. Losing the open-status race is a benign no-op and
    /// reports `Ok(false)`.
    fn close_position(&self, trade: &Trade, exit_price: f64, reason: CloseReason) -> Result<bool> {
        let exit_time = chrono::Utc::now().timestamp_millis();
        if !self.ledger.close_trade(trade.id, exit_price, exit_time, reason)? {
            debug!(
                "Trade #{} already closed; skipping {} close",
                trade.id,
                reason.label()
            );
            return Ok(false);
        }
        info!(
            "Closed trade #{} on {} ({}): entry {:.4}, exit {:.4}, pnl {:.2}",
            trade.id,
            trade.symbol,
            reason.label(),
            trade.entry_price,
            exit_price,
            trade.pnl_at(exit_price)
        );

        let mut closed = trade.clone();
        closed.exit_price = Some(exit_price);
        closed.exit_time = Some(exit_time);
        closed.profit_loss = trade.pnl_at(exit_price);
        closed.status = reason.status();
        let _ = self.events.send(TradeEvent::Closed(closed));
        Ok(true)
    }

    /// Close every open position at its symbol's latest recorded price.
    /// Per-trade failures are logged and skipped; returns how many closed.
    pub fn close_all_positions(&self) -> usize {
        let open_trades = match self.ledger.get_open_trades() {
            Ok(trades) => trades,
            Err(e) => {
                error!("Could not list open trades: {}", e);
                return 0;
            }
        };

        let mut closed = 0;
        for trade in open_trades {
            let price = match self.ledger.get_latest_price(&trade.symbol) {
                Ok(Some(price)) => price,
                Ok(None) => {
                    warn!(
                        "No recorded price for {}; leaving trade #{} open",
                        trade.symbol, trade.id
                    );
                    continue;
                }
                Err(e) => {
                    error!("Price lookup failed for {}: {}", trade.symbol, e);
                    continue;
                }
            };
            match self.close_position(&trade, price, CloseReason::Manual) {
                Ok(true) => closed += 1,
                Ok(false) => {}
                Err(e) => error!("Failed to force-close trade #{}: {}", trade.id, e),
            }
        }
        closed
    }

    /// Portfolio view for presentation consumers.
    pub fn get_performance_snapshot(&self) -> Result<PerformanceSnapshot> {
        let portfolio = self.ledger.get_portfolio()?;
        let open_trades = self.ledger.get_open_trades()?;
        let recent_trades = self.ledger.get_trade_history(10)?;
        let starting = self.settings.starting_balance;
        let total_return_pct = if starting == 0.0 {
            0.0
        } else {
            (portfolio.total_balance - starting) / starting * 100.0
        };
        Ok(PerformanceSnapshot {
            invested_amount: portfolio.invested(),
            open_trades_count: open_trades.len(),
            recent_trades,
            total_return_pct,
            portfolio,
        })
    }
}

impl MarketHandler for TradingEngine {
    fn on_tick(&self, tick: &Tick) {
        TradingEngine::on_tick(self, tick);
    }

    fn on_order_book(&self, symbol: &str, bids: &[PriceLevel], asks: &[PriceLevel]) {
        if let Err(e) = self.ledger.record_order_book(symbol, bids, asks) {
            error!("Failed to persist order book for {}: {}", symbol, e);
        }
    }
}
