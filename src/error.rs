use thiserror::Error;

/// Engine error taxonomy.
///
/// Lost close races are not errors: `Ledger::close_trade` reports them as
/// `Ok(false)` and callers treat that as a no-op.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration named a strategy outside the known set.
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    /// A strategy parameter failed validation.
    #[error("invalid strategy parameter `{name}`: {reason}")]
    InvalidParam { name: String, reason: String },

    /// The ledger store failed or is unavailable.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
