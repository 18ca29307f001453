use rust_decimal::Decimal;
use thiserror::Error;

/// Journal and P&L engine errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JournalError {
    #[error("No tick size/value available for futures symbol {symbol}")]
    InvalidInstrumentData { symbol: String },

    #[error("Trade {trade_id} has no initial stop loss")]
    MissingStopLoss { trade_id: String },

    #[error("Trade {trade_id} has zero risk: stop loss equals entry")]
    InvalidRisk { trade_id: String },

    #[error("Closure of {requested} exceeds remaining position size {available}")]
    ExceedsPositionSize { requested: Decimal, available: Decimal },

    #[error("Trade {trade_id} was modified concurrently after {attempts} attempts, please retry")]
    ConcurrentModification { trade_id: String, attempts: u32 },

    #[error("Trade not found: {0}")]
    TradeNotFound(String),

    #[error("Closure not found: {0}")]
    ClosureNotFound(String),

    #[error("Invalid trade: {0}")]
    InvalidTrade(String),

    #[error("Invalid closure: {0}")]
    InvalidClosure(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl JournalError {
    /// Whether this is an anticipated state in a partially filled-in journal
    /// that callers handle locally, as opposed to corrupt input or storage failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            JournalError::InvalidInstrumentData { .. }
                | JournalError::MissingStopLoss { .. }
                | JournalError::InvalidRisk { .. }
                | JournalError::ExceedsPositionSize { .. }
                | JournalError::ConcurrentModification { .. }
        )
    }
}

impl From<rusqlite::Error> for JournalError {
    fn from(e: rusqlite::Error) -> Self {
        JournalError::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, JournalError>;
