//! Tally - trade journal P&L, R-multiple and closure ledger engine

pub mod config;
pub mod error;
pub mod services;
pub mod types;

// Re-export commonly used types
pub use error::{JournalError, Result};
pub use services::{InstrumentRegistry, JournalService, SqliteStore, TickTable, TradeStore};
pub use types::*;
