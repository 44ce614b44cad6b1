//! SQLite implementation of the trade/portfolio ledger.
//!
//! A single `Mutex<Connection>` serializes every access, and open/close
//! additionally run inside a SQLite transaction so the trade row and the
//! portfolio aggregate can never diverge. The portfolio is one row with
//! `id = 1` enforced by a CHECK constraint; `close_trade` re-checks
//! `status = 'OPEN'` inside its transaction, so of two racing closes exactly
//! one wins and the loser gets `Ok(false)`.

use crate::error::Result;
use crate::services::Ledger;
use crate::types::{
    CloseReason, OpenTradeRequest, PairInfo, Portfolio, PriceLevel, PricePoint, Tick, Trade,
    TradeId, TradeSide, TradeStatus,
};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

const TRADE_COLUMNS: &str = "id, symbol, side, quantity, entry_price, exit_price, trade_amount, \
     fees, profit_loss, status, stop_loss_price, take_profit_price, entry_time, exit_time";

/// SQLite-backed ledger.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
    starting_balance: f64,
}

impl SqliteLedger {
    /// Open (or create) a ledger at the given path. A fresh database is
    /// seeded with `starting_balance`; an existing portfolio row keeps its
    /// balances.
    pub fn new<P: AsRef<Path>>(path: P, starting_balance: f64) -> Result<Self> {
        let conn = Connection::open(path)?;
        let ledger = Self {
            conn: Mutex::new(conn),
            starting_balance,
        };
        ledger.init_schema()?;
        info!("SQLite ledger initialized");
        Ok(ledger)
    }

    /// In-memory ledger (for testing).
    pub fn new_in_memory(starting_balance: f64) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let ledger = Self {
            conn: Mutex::new(conn),
            starting_balance,
        };
        ledger.init_schema()?;
        debug!("In-memory SQLite ledger initialized");
        Ok(ledger)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS pairs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT UNIQUE NOT NULL,
                base_currency TEXT NOT NULL,
                quote_currency TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS price_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                price REAL NOT NULL,
                bid REAL,
                ask REAL,
                volume REAL,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_price_data_symbol_ts
             ON price_data(symbol, timestamp DESC)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                quantity REAL NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL,
                trade_amount REAL NOT NULL,
                fees REAL NOT NULL,
                profit_loss REAL NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'OPEN',
                stop_loss_price REAL NOT NULL,
                take_profit_price REAL NOT NULL,
                entry_time INTEGER NOT NULL,
                exit_time INTEGER
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_symbol_status
             ON trades(symbol, status)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS order_book (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                symbol TEXT NOT NULL,
                bids TEXT NOT NULL,
                asks TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            )",
            [],
        )?;

        // Single aggregate row; every open/close rewrites it transactionally.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS portfolio (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                total_balance REAL NOT NULL,
                available_balance REAL NOT NULL,
                total_trades INTEGER NOT NULL DEFAULT 0,
                winning_trades INTEGER NOT NULL DEFAULT 0,
                losing_trades INTEGER NOT NULL DEFAULT 0,
                total_profit_loss REAL NOT NULL DEFAULT 0,
                last_updated INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO portfolio (id, total_balance, available_balance, last_updated)
             VALUES (1, ?1, ?1, ?2)",
            params![self.starting_balance, now_ms()],
        )?;

        Ok(())
    }
}

impl Ledger for SqliteLedger {
    // ========== Price Methods ==========

    fn record_tick(&self, tick: &Tick) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO price_data (symbol, price, bid, ask, volume, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                tick.symbol,
                tick.price,
                tick.bid,
                tick.ask,
                tick.volume,
                tick.observed_at
            ],
        )?;
        Ok(())
    }

    fn record_order_book(
        &self,
        symbol: &str,
        bids: &[PriceLevel],
        asks: &[PriceLevel],
    ) -> Result<()> {
        let bids_json = serde_json::to_string(bids)?;
        let asks_json = serde_json::to_string(asks)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO order_book (symbol, bids, asks, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![symbol, bids_json, asks_json, now_ms()],
        )?;
        Ok(())
    }

    fn add_pair(&self, symbol: &str, base_currency: &str, quote_currency: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO pairs (symbol, base_currency, quote_currency, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![symbol, base_currency, quote_currency, now_ms()],
        )?;
        Ok(())
    }

    fn get_usd_pairs(&self) -> Result<Vec<PairInfo>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT symbol, base_currency, quote_currency, is_active, created_at
             FROM pairs
             WHERE quote_currency = 'USD' AND is_active = 1
             ORDER BY symbol",
        )?;
        let pairs = stmt
            .query_map([], |row| {
                Ok(PairInfo {
                    symbol: row.get(0)?,
                    base_currency: row.get(1)?,
                    quote_currency: row.get(2)?,
                    is_active: row.get::<_, i64>(3)? != 0,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    fn get_latest_price(&self, symbol: &str) -> Result<Option<f64>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            "SELECT price FROM price_data
             WHERE symbol = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT 1",
            params![symbol],
            |row| row.get(0),
        );
        match result {
            Ok(price) => Ok(Some(price)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn get_price_history(&self, symbol: &str, limit: usize) -> Result<Vec<PricePoint>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT price, bid, ask, volume, timestamp FROM price_data
             WHERE symbol = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )?;
        let mut points = stmt
            .query_map(params![symbol, limit as i64], |row| {
                Ok(PricePoint {
                    price: row.get(0)?,
                    bid: row.get(1)?,
                    ask: row.get(2)?,
                    volume: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        points.reverse();
        Ok(points)
    }

    // ========== Trade Methods ==========

    fn open_trade(&self, req: &OpenTradeRequest) -> Result<TradeId> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = now_ms();

        tx.execute(
            "INSERT INTO trades (symbol, side, quantity, entry_price, trade_amount, fees,
                                 stop_loss_price, take_profit_price, entry_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                req.symbol,
                req.side.as_str(),
                req.quantity,
                req.entry_price,
                req.trade_amount,
                req.fees,
                req.stop_loss_price,
                req.take_profit_price,
                now,
            ],
        )?;
        let trade_id = tx.last_insert_rowid();

        // Reserve notional plus fees; total_balance is untouched until close.
        tx.execute(
            "UPDATE portfolio
             SET available_balance = available_balance - ?1,
                 total_trades = total_trades + 1,
                 last_updated = ?2
             WHERE id = 1",
            params![req.trade_amount + req.fees, now],
        )?;

        tx.commit()?;
        Ok(trade_id)
    }

    fn close_trade(
        &self,
        trade_id: TradeId,
        exit_price: f64,
        exit_time: i64,
        reason: CloseReason,
    ) -> Result<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let open = tx.query_row(
            "SELECT side, quantity, entry_price, trade_amount, fees
             FROM trades
             WHERE id = ?1 AND status = 'OPEN'",
            params![trade_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                ))
            },
        );
        let (side, quantity, entry_price, trade_amount, fees) = match open {
            Ok(trade) => trade,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let profit_loss = match parse_side(&side) {
            TradeSide::Buy => (exit_price - entry_price) * quantity - fees,
            TradeSide::Sell => (entry_price - exit_price) * quantity - fees,
        };

        let updated = tx.execute(
            "UPDATE trades
             SET exit_price = ?1, profit_loss = ?2, status = ?3, exit_time = ?4
             WHERE id = ?5 AND status = 'OPEN'",
            params![
                exit_price,
                profit_loss,
                reason.status().as_str(),
                exit_time,
                trade_id
            ],
        )?;
        if updated == 0 {
            return Ok(false);
        }

        tx.execute(
            "UPDATE portfolio
             SET available_balance = available_balance + ?1,
                 total_balance = total_balance + ?2,
                 total_profit_loss = total_profit_loss + ?2,
                 winning_trades = winning_trades + ?3,
                 losing_trades = losing_trades + ?4,
                 last_updated = ?5
             WHERE id = 1",
            params![
                trade_amount + profit_loss,
                profit_loss,
                if profit_loss > 0.0 { 1 } else { 0 },
                if profit_loss > 0.0 { 0 } else { 1 },
                exit_time,
            ],
        )?;

        tx.commit()?;
        Ok(true)
    }

    fn get_open_trades(&self) -> Result<Vec<Trade>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades
             WHERE status = 'OPEN'
             ORDER BY entry_time DESC, id DESC"
        ))?;
        let trades = stmt
            .query_map([], trade_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(trades)
    }

    fn get_open_trades_for_symbol(&self, symbol: &str) -> Result<Vec<Trade>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades
             WHERE symbol = ?1 AND status = 'OPEN'
             ORDER BY entry_time DESC, id DESC"
        ))?;
        let trades = stmt
            .query_map(params![symbol], trade_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(trades)
    }

    fn get_trade_history(&self, limit: usize) -> Result<Vec<Trade>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRADE_COLUMNS} FROM trades
             ORDER BY entry_time DESC, id DESC
             LIMIT ?1"
        ))?;
        let trades = stmt
            .query_map(params![limit as i64], trade_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(trades)
    }

    // ========== Portfolio Methods ==========

    fn get_portfolio(&self) -> Result<Portfolio> {
        let conn = self.conn.lock().unwrap();
        let portfolio = conn.query_row(
            "SELECT total_balance, available_balance, total_trades, winning_trades,
                    losing_trades, total_profit_loss, last_updated
             FROM portfolio WHERE id = 1",
            [],
            |row| {
                Ok(Portfolio {
                    total_balance: row.get(0)?,
                    available_balance: row.get(1)?,
                    total_trades: row.get(2)?,
                    winning_trades: row.get(3)?,
                    losing_trades: row.get(4)?,
                    total_profit_loss: row.get(5)?,
                    last_updated: row.get(6)?,
                })
            },
        )?;
        Ok(portfolio)
    }

    fn count_trades(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_price_records(&self) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM price_data", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn clear_trades(&self) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM trades", [])?;
        tx.execute(
            "UPDATE portfolio
             SET total_trades = 0,
                 winning_trades = 0,
                 losing_trades = 0,
                 total_profit_loss = 0,
                 last_updated = ?1
             WHERE id = 1",
            params![now_ms()],
        )?;
        tx.commit()?;
        info!("Cleared all trades and portfolio counters");
        Ok(())
    }

    fn reset_all(&self) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM trades", [])?;
        tx.execute("DELETE FROM price_data", [])?;
        tx.execute("DELETE FROM order_book", [])?;
        tx.execute(
            "UPDATE portfolio
             SET total_balance = ?1,
                 available_balance = ?1,
                 total_trades = 0,
                 winning_trades = 0,
                 losing_trades = 0,
                 total_profit_loss = 0,
                 last_updated = ?2
             WHERE id = 1",
            params![self.starting_balance, now_ms()],
        )?;
        tx.commit()?;
        info!("Ledger reset to starting balance");
        Ok(())
    }
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<Trade> {
    Ok(Trade {
        id: row.get(0)?,
        symbol: row.get(1)?,
        side: parse_side(&row.get::<_, String>(2)?),
        quantity: row.get(3)?,
        entry_price: row.get(4)?,
        exit_price: row.get(5)?,
        trade_amount: row.get(6)?,
        fees: row.get(7)?,
        profit_loss: row.get(8)?,
        status: parse_status(&row.get::<_, String>(9)?),
        stop_loss_price: row.get(10)?,
        take_profit_price: row.get(11)?,
        entry_time: row.get(12)?,
        exit_time: row.get(13)?,
    })
}

fn parse_side(s: &str) -> TradeSide {
    match s {
        "SELL" => TradeSide::Sell,
        _ => TradeSide::Buy,
    }
}

fn parse_status(s: &str) -> TradeStatus {
    match s {
        "CLOSED" => TradeStatus::Closed,
        "STOPPED" => TradeStatus::Stopped,
        _ => TradeStatus::Open,
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
