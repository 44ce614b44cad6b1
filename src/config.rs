use std::env;

/// Trade sizing and risk thresholds.
#[derive(Debug, Clone)]
pub struct TradeSettings {
    /// Notional amount per trade, in quote currency.
    pub trade_amount: f64,
    /// Proportional maker fee charged on trade notional at open.
    pub maker_fee: f64,
    /// Take-profit distance as a fraction of entry price.
    pub profit_margin: f64,
    /// Stop-loss distance as a fraction of entry price.
    pub stop_loss: f64,
    /// Balance the portfolio is seeded with.
    pub starting_balance: f64,
    /// Price points retained per symbol for signal evaluation.
    pub max_history: usize,
}

impl Default for TradeSettings {
    fn default() -> Self {
        Self {
            trade_amount: 10.0,
            maker_fee: 0.0025,
            profit_margin: 0.02,
            stop_loss: 0.015,
            starting_balance: 100.0,
            max_history: 100,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite ledger path.
    pub db_path: String,
    /// Engine trade settings.
    pub trading: TradeSettings,
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = TradeSettings::default();
        Self {
            db_path: env::var("PAPERTRADE_DB").unwrap_or_else(|_| "papertrade.db".to_string()),
            trading: TradeSettings {
                trade_amount: env_parse("TRADE_AMOUNT", defaults.trade_amount),
                maker_fee: env_parse("MAKER_FEE", defaults.maker_fee),
                profit_margin: env_parse("PROFIT_MARGIN", defaults.profit_margin),
                stop_loss: env_parse("STOP_LOSS", defaults.stop_loss),
                starting_balance: env_parse("STARTING_BALANCE", defaults.starting_balance),
                max_history: env_parse("MAX_PRICE_HISTORY", defaults.max_history),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
