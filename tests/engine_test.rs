//! End-to-end trading engine tests.
//!
//! Tests cover:
//! - Signal-driven entries and trade sizing
//! - Run-state semantics (not started, started, stopped)
//! - Exit monitoring and the take-profit tie-break
//! - Balance gating and default safety
//! - Performance snapshots and close-all

use papertrade::types::*;
use papertrade::{Ledger, SqliteLedger, TradeSettings, TradingEngine};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

fn setup(starting_balance: f64) -> (Arc<TradingEngine>, Arc<SqliteLedger>) {
    let ledger = Arc::new(SqliteLedger::new_in_memory(starting_balance).unwrap());
    let settings = TradeSettings {
        starting_balance,
        ..TradeSettings::default()
    };
    let engine = TradingEngine::new(ledger.clone(), settings);
    (engine, ledger)
}

fn no_params() -> HashMap<String, Value> {
    HashMap::new()
}

fn feed(engine: &TradingEngine, symbol: &str, prices: &[f64]) {
    for &price in prices {
        engine.on_tick(&Tick::new(symbol, price));
    }
}

fn buy_request(symbol: &str, entry: f64, stop_loss: f64, take_profit: f64) -> OpenTradeRequest {
    OpenTradeRequest {
        symbol: symbol.to_string(),
        side: TradeSide::Buy,
        quantity: 10.0 / entry,
        entry_price: entry,
        trade_amount: 10.0,
        fees: 0.025,
        stop_loss_price: stop_loss,
        take_profit_price: take_profit,
    }
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// =============================================================================
// Entry signals
// =============================================================================

mod entry_tests {
    use super::*;

    #[test]
    fn sma_crossover_opens_one_buy() {
        let (engine, ledger) = setup(100.0);
        engine.configure_strategy("SMA_CROSSOVER", &no_params()).unwrap();
        engine.start();

        feed(&engine, "XBT/USD", &[100.0, 101.0, 102.0, 103.0, 104.0]);

        let open = ledger.get_open_trades().unwrap();
        assert_eq!(open.len(), 1);

        let trade = &open[0];
        assert_eq!(trade.symbol, "XBT/USD");
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.entry_price, 104.0);
        assert!(approx(trade.quantity, 10.0 / 104.0));
        assert!(approx(trade.trade_amount, 10.0));
        assert!(approx(trade.fees, 10.0 * 0.0025));
        assert!(approx(trade.stop_loss_price, 104.0 * 0.985));
        assert!(approx(trade.take_profit_price, 104.0 * 1.02));

        let portfolio = ledger.get_portfolio().unwrap();
        assert_eq!(portfolio.total_trades, 1);
        assert!(approx(portfolio.available_balance, 100.0 - 10.025));
        assert!(approx(portfolio.total_balance, 100.0));
    }

    #[test]
    fn no_strategy_never_trades() {
        let (engine, ledger) = setup(100.0);
        engine.start();

        feed(&engine, "XBT/USD", &[100.0, 101.0, 102.0, 103.0, 104.0, 105.0]);
        feed(&engine, "ETH/USD", &[50.0, 49.0, 51.0, 53.0, 55.0, 58.0]);

        assert_eq!(ledger.count_trades().unwrap(), 0);
        // Ticks are still persisted.
        assert_eq!(ledger.count_price_records().unwrap(), 12);
    }

    #[test]
    fn insufficient_balance_suppresses_the_signal() {
        let (engine, ledger) = setup(5.0);
        engine.configure_strategy("SMA_CROSSOVER", &no_params()).unwrap();
        engine.start();

        feed(&engine, "XBT/USD", &[100.0, 101.0, 102.0, 103.0, 104.0]);

        assert_eq!(ledger.count_trades().unwrap(), 0);
        let portfolio = ledger.get_portfolio().unwrap();
        assert!(approx(portfolio.available_balance, 5.0));
    }

    #[test]
    fn symbols_evaluate_independently() {
        let (engine, ledger) = setup(100.0);
        engine.configure_strategy("SMA_CROSSOVER", &no_params()).unwrap();
        engine.start();

        // Rising on one symbol, falling on the other.
        feed(&engine, "XBT/USD", &[100.0, 101.0, 102.0, 103.0, 104.0]);
        feed(&engine, "ETH/USD", &[50.0, 49.0, 48.0, 47.0, 46.0]);

        let open = ledger.get_open_trades().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].symbol, "XBT/USD");
    }
}

// =============================================================================
// Run state
// =============================================================================

mod run_state_tests {
    use super::*;

    #[test]
    fn ticks_before_start_only_record_prices() {
        let (engine, ledger) = setup(100.0);
        engine.configure_strategy("SMA_CROSSOVER", &no_params()).unwrap();

        feed(&engine, "XBT/USD", &[100.0, 101.0, 102.0, 103.0, 104.0]);

        assert_eq!(ledger.count_trades().unwrap(), 0);
        assert_eq!(ledger.count_price_records().unwrap(), 5);
    }

    #[test]
    fn stop_blocks_new_trades() {
        let (engine, ledger) = setup(100.0);
        engine.configure_strategy("SMA_CROSSOVER", &no_params()).unwrap();
        engine.start();

        feed(&engine, "XBT/USD", &[100.0, 101.0, 102.0]);
        engine.stop();
        feed(&engine, "XBT/USD", &[103.0, 104.0]);

        assert_eq!(ledger.count_trades().unwrap(), 0);
        assert_eq!(ledger.count_price_records().unwrap(), 5);
        assert!(!engine.is_running());
    }
}

// =============================================================================
// Exit monitoring
// =============================================================================

mod exit_tests {
    use super::*;

    #[test]
    fn take_profit_wins_the_tie_break() {
        let (engine, ledger) = setup(100.0);
        // Both thresholds sit exactly at 101, so a tick at 101 triggers both.
        ledger
            .open_trade(&buy_request("XBT/USD", 100.0, 101.0, 101.0))
            .unwrap();
        engine.start();

        engine.on_tick(&Tick::new("XBT/USD", 101.0));

        let trade = &ledger.get_trade_history(1).unwrap()[0];
        assert_eq!(trade.status, TradeStatus::Closed);
        assert_eq!(trade.exit_price, Some(101.0));
    }

    #[test]
    fn stop_loss_close_is_recorded_as_stopped() {
        let (engine, ledger) = setup(100.0);
        ledger
            .open_trade(&buy_request("XBT/USD", 100.0, 98.5, 102.0))
            .unwrap();
        engine.start();

        engine.on_tick(&Tick::new("XBT/USD", 98.0));

        let trade = &ledger.get_trade_history(1).unwrap()[0];
        assert_eq!(trade.status, TradeStatus::Stopped);
        assert!(trade.profit_loss < 0.0);

        let portfolio = ledger.get_portfolio().unwrap();
        assert_eq!(portfolio.losing_trades, 1);
    }

    #[test]
    fn prices_inside_the_band_leave_the_trade_open() {
        let (engine, ledger) = setup(100.0);
        ledger
            .open_trade(&buy_request("XBT/USD", 100.0, 98.5, 102.0))
            .unwrap();
        engine.start();

        engine.on_tick(&Tick::new("XBT/USD", 100.5));
        engine.on_tick(&Tick::new("XBT/USD", 99.0));

        assert_eq!(ledger.get_open_trades().unwrap().len(), 1);
    }

    #[test]
    fn other_symbols_do_not_trigger_exits() {
        let (engine, ledger) = setup(100.0);
        ledger
            .open_trade(&buy_request("XBT/USD", 100.0, 98.5, 102.0))
            .unwrap();
        engine.start();

        engine.on_tick(&Tick::new("ETH/USD", 1000.0));

        assert_eq!(ledger.get_open_trades().unwrap().len(), 1);
    }
}

// =============================================================================
// Administrative surface
// =============================================================================

mod admin_tests {
    use super::*;

    #[test]
    fn close_all_positions_uses_latest_prices() {
        let (engine, ledger) = setup(100.0);
        ledger
            .open_trade(&buy_request("XBT/USD", 100.0, 98.5, 102.0))
            .unwrap();
        ledger
            .open_trade(&buy_request("ETH/USD", 50.0, 49.0, 51.0))
            .unwrap();
        ledger.record_tick(&Tick::new("XBT/USD", 100.5)).unwrap();
        ledger.record_tick(&Tick::new("ETH/USD", 50.2)).unwrap();

        assert_eq!(engine.close_all_positions(), 2);
        assert!(ledger.get_open_trades().unwrap().is_empty());

        for trade in ledger.get_trade_history(10).unwrap() {
            assert_eq!(trade.status, TradeStatus::Closed);
        }
    }

    #[test]
    fn close_all_skips_symbols_without_prices() {
        let (engine, ledger) = setup(100.0);
        ledger
            .open_trade(&buy_request("XBT/USD", 100.0, 98.5, 102.0))
            .unwrap();

        assert_eq!(engine.close_all_positions(), 0);
        assert_eq!(ledger.get_open_trades().unwrap().len(), 1);
    }

    #[test]
    fn performance_snapshot_reports_portfolio_state() {
        let (engine, ledger) = setup(100.0);
        engine.configure_strategy("SMA_CROSSOVER", &no_params()).unwrap();
        engine.start();
        feed(&engine, "XBT/USD", &[100.0, 101.0, 102.0, 103.0, 104.0]);

        let snapshot = engine.get_performance_snapshot().unwrap();
        assert_eq!(snapshot.open_trades_count, 1);
        assert!(approx(snapshot.invested_amount, 10.025));
        assert!(approx(snapshot.total_return_pct, 0.0));
        assert_eq!(snapshot.recent_trades.len(), 1);

        // Close in profit; the snapshot tracks the realized gain.
        let trade_id = ledger.get_open_trades().unwrap()[0].id;
        assert!(ledger
            .close_trade(trade_id, 110.0, 2_000, CloseReason::Manual)
            .unwrap());

        let snapshot = engine.get_performance_snapshot().unwrap();
        assert_eq!(snapshot.open_trades_count, 0);
        assert!(approx(snapshot.invested_amount, 0.0));
        assert!(snapshot.total_return_pct > 0.0);
        assert!(approx(
            snapshot.total_return_pct,
            (snapshot.portfolio.total_balance - 100.0) / 100.0 * 100.0
        ));
    }

    #[test]
    fn trade_events_are_broadcast() {
        let (engine, ledger) = setup(100.0);
        let mut events = engine.subscribe_trades();

        engine.configure_strategy("SMA_CROSSOVER", &no_params()).unwrap();
        engine.start();
        feed(&engine, "XBT/USD", &[100.0, 101.0, 102.0, 103.0, 104.0]);

        match events.try_recv().unwrap() {
            TradeEvent::Opened(trade) => assert_eq!(trade.symbol, "XBT/USD"),
            other => panic!("expected Opened event, got {:?}", other),
        }

        ledger.record_tick(&Tick::new("XBT/USD", 120.0)).unwrap();
        engine.close_all_positions();

        match events.try_recv().unwrap() {
            TradeEvent::Closed(trade) => {
                assert_eq!(trade.status, TradeStatus::Closed);
                assert_eq!(trade.exit_price, Some(120.0));
            }
            other => panic!("expected Closed event, got {:?}", other),
        }
    }
}

// =============================================================================
// Feed integration
// =============================================================================

#[tokio::test]
async fn run_consumes_a_tick_channel_until_close() {
    let (engine, ledger) = setup(100.0);
    engine.configure_strategy("SMA_CROSSOVER", &no_params()).unwrap();
    engine.start();

    let (tx, rx) = mpsc::channel(16);
    let consumer = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run(rx).await })
    };

    for price in [100.0, 101.0, 102.0, 103.0, 104.0] {
        tx.send(Tick::new("XBT/USD", price)).await.unwrap();
    }
    drop(tx);
    consumer.await.unwrap();

    assert_eq!(ledger.count_price_records().unwrap(), 5);
    assert_eq!(ledger.get_open_trades().unwrap().len(), 1);
}
