//! Ledger concurrency and durability tests.
//!
//! The inline suites in `sqlite_ledger.rs` cover single-threaded accounting;
//! these tests exercise the guarantees that only show up across threads and
//! process restarts.

use papertrade::types::*;
use papertrade::{Ledger, SqliteLedger};
use std::sync::Arc;
use std::thread;

fn buy_request(symbol: &str, entry: f64, amount: f64, fees: f64) -> OpenTradeRequest {
    OpenTradeRequest {
        symbol: symbol.to_string(),
        side: TradeSide::Buy,
        quantity: amount / entry,
        entry_price: entry,
        trade_amount: amount,
        fees,
        stop_loss_price: entry * 0.985,
        take_profit_price: entry * 1.02,
    }
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// =============================================================================
// Close races
// =============================================================================

#[test]
fn concurrent_double_close_wins_exactly_once() {
    let store = Arc::new(SqliteLedger::new_in_memory(100.0).unwrap());
    let id = store
        .open_trade(&buy_request("XBT/USD", 100.0, 10.0, 0.025))
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                store
                    .close_trade(id, 102.0, 1_000, CloseReason::TakeProfit)
                    .unwrap()
            })
        })
        .collect();

    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|&won| won)
        .count();
    assert_eq!(wins, 1);

    // Portfolio mutated exactly once.
    let portfolio = store.get_portfolio().unwrap();
    assert_eq!(portfolio.winning_trades + portfolio.losing_trades, 1);
    let pnl = (102.0 - 100.0) * 0.1 - 0.025;
    assert!(approx(portfolio.total_balance, 100.0 + pnl));
}

#[test]
fn concurrent_opens_conserve_balance() {
    let store = Arc::new(SqliteLedger::new_in_memory(1000.0).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                let symbol = format!("SYM{}/USD", t);
                for _ in 0..5 {
                    store
                        .open_trade(&buy_request(&symbol, 20.0, 10.0, 0.025))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let portfolio = store.get_portfolio().unwrap();
    assert_eq!(portfolio.total_trades, 20);
    assert!(approx(portfolio.available_balance, 1000.0 - 20.0 * 10.025));
    assert!(approx(portfolio.total_balance, 1000.0));
}

#[test]
fn interleaved_opens_and_closes_reconcile() {
    let store = Arc::new(SqliteLedger::new_in_memory(1000.0).unwrap());

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = store.clone();
            thread::spawn(move || {
                let symbol = format!("SYM{}/USD", t);
                for _ in 0..5 {
                    let id = store
                        .open_trade(&buy_request(&symbol, 20.0, 10.0, 0.025))
                        .unwrap();
                    // Close flat: pnl is exactly -fees.
                    assert!(store
                        .close_trade(id, 20.0, 2_000, CloseReason::Manual)
                        .unwrap());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let portfolio = store.get_portfolio().unwrap();
    assert_eq!(portfolio.total_trades, 20);
    assert_eq!(portfolio.winning_trades + portfolio.losing_trades, 20);
    assert!(approx(portfolio.total_balance, 1000.0 - 20.0 * 0.025));
    assert!(approx(portfolio.available_balance, portfolio.total_balance));
    assert!(store.get_open_trades().unwrap().is_empty());
}

// =============================================================================
// Durability
// =============================================================================

#[test]
fn ledger_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");

    {
        let store = SqliteLedger::new(&path, 100.0).unwrap();
        store
            .open_trade(&buy_request("XBT/USD", 100.0, 10.0, 0.025))
            .unwrap();
    }

    // Reopening with a different seed keeps the existing portfolio row.
    let store = SqliteLedger::new(&path, 500.0).unwrap();
    let portfolio = store.get_portfolio().unwrap();
    assert!(approx(portfolio.available_balance, 89.975));
    assert!(approx(portfolio.total_balance, 100.0));

    let open = store.get_open_trades().unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].symbol, "XBT/USD");
    assert_eq!(open[0].status, TradeStatus::Open);
}
