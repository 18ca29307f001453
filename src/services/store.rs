//! Persistence seam for instruments, trades and closures.

use crate::error::Result;
use crate::services::ledger::ClosureChange;
use crate::types::{Closure, Instrument, Trade, TradeStatus};
use rust_decimal::Decimal;

/// A trade and all of its closures, read together.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSnapshot {
    pub trade: Trade,
    pub closures: Vec<Closure>,
}

impl PositionSnapshot {
    pub fn version(&self) -> i64 {
        self.trade.version
    }
}

/// A closure change plus the trade state derived from it, committed as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureCommit {
    pub trade_id: String,
    /// Version of the snapshot the change was planned against
    pub expected_version: i64,
    pub change: ClosureChange,
    pub remaining_size: Decimal,
    pub status: TradeStatus,
}

/// Storage for the journal.
///
/// `commit_closure_change` must apply the closure change and the trade's new
/// remaining size and status together, and must fail with
/// `ConcurrentModification` without writing anything when the stored trade
/// version no longer equals `expected_version`.
pub trait TradeStore: Send + Sync {
    fn save_instrument(&self, instrument: &Instrument) -> Result<()>;

    fn get_instrument(&self, symbol: &str) -> Result<Option<Instrument>>;

    fn list_instruments(&self) -> Result<Vec<Instrument>>;

    fn insert_trade(&self, trade: &Trade) -> Result<()>;

    fn get_trade(&self, trade_id: &str) -> Result<Option<Trade>>;

    fn list_trades(&self) -> Result<Vec<Trade>>;

    /// Replace stop loss and take profit, bumping the version.
    fn update_trade_levels(
        &self,
        trade_id: &str,
        expected_version: i64,
        initial_stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<Trade>;

    /// Delete a trade and its closures. Returns false if it did not exist.
    fn delete_trade(&self, trade_id: &str) -> Result<bool>;

    fn load_position(&self, trade_id: &str) -> Result<Option<PositionSnapshot>>;

    fn commit_closure_change(&self, commit: &ClosureCommit) -> Result<Trade>;
}
