pub mod engine;
pub mod history;
pub mod ledger;
pub mod sqlite_ledger;
pub mod strategy;

pub use engine::{MarketHandler, TradingEngine};
pub use history::PriceHistory;
pub use ledger::Ledger;
pub use sqlite_ledger::SqliteLedger;
pub use strategy::Strategy;
