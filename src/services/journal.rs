//! Journal Service
//!
//! Front door for callers that log trades and exits:
//! - Instrument registration
//! - Trade creation, level changes and deletion
//! - Closure create/edit/delete with trade state recomputed in the same commit
//! - Summaries and journal-wide statistics
//!
//! Every closure mutation re-reads the trade and all of its closures, plans
//! the change against that fresh snapshot and commits it with the snapshot's
//! version. A conflicting writer makes the commit fail; the service then
//! starts over from a new read, up to `max_mutation_retries` extra times.

use crate::config::JournalConfig;
use crate::error::{JournalError, Result};
use crate::services::instruments::InstrumentRegistry;
use crate::services::ledger::{self, ClosureChange, ClosurePlan};
use crate::services::pnl;
use crate::services::stats;
use crate::services::store::{ClosureCommit, PositionSnapshot, TradeStore};
use crate::types::{Closure, Instrument, JournalStats, NewTrade, Trade, TradeSummary};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A committed closure and the trade state it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosureOutcome {
    pub trade: Trade,
    pub closure: Closure,
}

/// Trade journal backed by a [`TradeStore`].
pub struct JournalService<S: TradeStore> {
    store: Arc<S>,
    instruments: InstrumentRegistry,
    config: JournalConfig,
}

impl<S: TradeStore> JournalService<S> {
    /// Create the service and load stored instruments into the registry.
    pub fn new(store: Arc<S>, config: JournalConfig) -> Result<Self> {
        let instruments = match config.tick_table() {
            Some(table) => InstrumentRegistry::new(table),
            None => InstrumentRegistry::without_fallback(),
        };

        for instrument in store.list_instruments()? {
            instruments.register(instrument);
        }
        info!("Journal service ready with {} instruments", instruments.len());

        Ok(Self {
            store,
            instruments,
            config,
        })
    }

    pub fn instruments(&self) -> &InstrumentRegistry {
        &self.instruments
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ==========================================================================
    // Instruments
    // ==========================================================================

    /// Save an instrument. Futures must carry positive tick size and value
    /// when they carry either.
    pub fn register_instrument(&self, instrument: Instrument) -> Result<()> {
        let partial_ticks = instrument.tick_size.is_some() || instrument.tick_value.is_some();
        if instrument.asset_class.is_futures() && partial_ticks && instrument.tick_spec().is_none() {
            return Err(JournalError::InvalidInstrumentData {
                symbol: instrument.symbol,
            });
        }
        self.store.save_instrument(&instrument)?;
        self.instruments.register(instrument);
        Ok(())
    }

    /// The instrument a trade is priced with.
    pub fn instrument_for(&self, trade: &Trade) -> Instrument {
        self.instruments.resolve(&trade.symbol, trade.asset_class)
    }

    // ==========================================================================
    // Trades
    // ==========================================================================

    pub fn open_trade(&self, request: NewTrade) -> Result<Trade> {
        let trade = Trade::open(request)?;
        self.store.insert_trade(&trade)?;
        info!(
            "Opened {} {} trade {} on {} @ {}",
            trade.direction, trade.position_size, trade.id, trade.symbol, trade.entry_price
        );
        Ok(trade)
    }

    pub fn get_trade(&self, trade_id: &str) -> Result<Trade> {
        self.store
            .get_trade(trade_id)?
            .ok_or_else(|| JournalError::TradeNotFound(trade_id.to_string()))
    }

    pub fn closures(&self, trade_id: &str) -> Result<Vec<Closure>> {
        Ok(self.snapshot(trade_id)?.closures)
    }

    /// Change the stop loss and take profit. Closure R-multiples already
    /// recorded are left as they were.
    pub fn modify_levels(
        &self,
        trade_id: &str,
        initial_stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<Trade> {
        for level in [initial_stop_loss, take_profit].into_iter().flatten() {
            if level <= Decimal::ZERO {
                return Err(JournalError::InvalidTrade(format!(
                    "price levels must be positive, got {}",
                    level
                )));
            }
        }

        self.with_retry(trade_id, || {
            let trade = self.get_trade(trade_id)?;
            self.store
                .update_trade_levels(trade_id, trade.version, initial_stop_loss, take_profit)
        })
    }

    /// Delete a trade together with its closures.
    pub fn delete_trade(&self, trade_id: &str) -> Result<()> {
        if !self.store.delete_trade(trade_id)? {
            return Err(JournalError::TradeNotFound(trade_id.to_string()));
        }
        Ok(())
    }

    // ==========================================================================
    // Closures
    // ==========================================================================

    /// Record an exit of `closed_size` at `close_price`.
    pub fn add_closure(
        &self,
        trade_id: &str,
        close_price: Decimal,
        closed_size: Decimal,
    ) -> Result<ClosureOutcome> {
        let (trade, plan) = self.mutate_closures(trade_id, |snapshot, instrument| {
            let mut closure = Closure::new(snapshot.trade.id.clone(), close_price, closed_size);
            closure.r_multiple = closure_r_multiple(&snapshot.trade, instrument, &closure);
            Ok(ClosureChange::Insert(closure))
        })?;
        Ok(ClosureOutcome {
            closure: planned_closure(plan.change)?,
            trade,
        })
    }

    /// Change the price and size of a recorded exit.
    pub fn edit_closure(
        &self,
        trade_id: &str,
        closure_id: &str,
        close_price: Decimal,
        closed_size: Decimal,
    ) -> Result<ClosureOutcome> {
        let (trade, plan) = self.mutate_closures(trade_id, |snapshot, instrument| {
            let mut closure = snapshot
                .closures
                .iter()
                .find(|c| c.id == closure_id)
                .cloned()
                .ok_or_else(|| JournalError::ClosureNotFound(closure_id.to_string()))?;
            closure.close_price = close_price;
            closure.closed_size = closed_size;
            closure.r_multiple = closure_r_multiple(&snapshot.trade, instrument, &closure);
            Ok(ClosureChange::Update(closure))
        })?;
        Ok(ClosureOutcome {
            closure: planned_closure(plan.change)?,
            trade,
        })
    }

    /// Remove a recorded exit.
    pub fn delete_closure(&self, trade_id: &str, closure_id: &str) -> Result<Trade> {
        let (trade, _) = self.mutate_closures(trade_id, |_, _| {
            Ok(ClosureChange::Delete {
                closure_id: closure_id.to_string(),
            })
        })?;
        Ok(trade)
    }

    // ==========================================================================
    // Reporting
    // ==========================================================================

    pub fn trade_summary(&self, trade_id: &str) -> Result<TradeSummary> {
        let snapshot = self.snapshot(trade_id)?;
        let instrument = self.instrument_for(&snapshot.trade);
        stats::summarize(&snapshot.trade, &instrument, &snapshot.closures)
    }

    /// Summaries of every trade. Futures trades that cannot be priced are
    /// skipped with a warning.
    pub fn summaries(&self) -> Result<Vec<TradeSummary>> {
        let mut summaries = Vec::new();
        for trade in self.store.list_trades()? {
            match self.trade_summary(&trade.id) {
                Ok(summary) => summaries.push(summary),
                Err(JournalError::InvalidInstrumentData { symbol }) => {
                    warn!("Skipping trade {}: no tick data for {}", trade.id, symbol);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(summaries)
    }

    pub fn journal_stats(&self) -> Result<JournalStats> {
        Ok(stats::journal_stats(&self.summaries()?))
    }

    // ==========================================================================
    // Internals
    // ==========================================================================

    fn snapshot(&self, trade_id: &str) -> Result<PositionSnapshot> {
        self.store
            .load_position(trade_id)?
            .ok_or_else(|| JournalError::TradeNotFound(trade_id.to_string()))
    }

    /// Read, plan and commit a closure change as one unit, retrying on conflict.
    fn mutate_closures<F>(&self, trade_id: &str, build: F) -> Result<(Trade, ClosurePlan)>
    where
        F: Fn(&PositionSnapshot, &Instrument) -> Result<ClosureChange>,
    {
        self.with_retry(trade_id, || {
            let snapshot = self.snapshot(trade_id)?;
            let instrument = self.instrument_for(&snapshot.trade);
            let change = build(&snapshot, &instrument)?;
            let plan = ledger::apply_change(&snapshot.trade, &snapshot.closures, change)?;

            let commit = ClosureCommit {
                trade_id: snapshot.trade.id.clone(),
                expected_version: snapshot.version(),
                change: plan.change.clone(),
                remaining_size: plan.remaining_size,
                status: plan.status,
            };
            let trade = self.store.commit_closure_change(&commit)?;
            debug!(
                "Closure {} on trade {} committed at version {}",
                commit.change.closure_id(),
                trade.id,
                trade.version
            );
            Ok((trade, plan))
        })
    }

    fn with_retry<T>(&self, trade_id: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let attempts = self.config.max_mutation_retries.saturating_add(1);
        for attempt in 1..=attempts {
            match op() {
                Err(JournalError::ConcurrentModification { .. }) => {
                    warn!(
                        "Trade {} changed during mutation (attempt {}/{})",
                        trade_id, attempt, attempts
                    );
                }
                other => return other,
            }
        }
        Err(JournalError::ConcurrentModification {
            trade_id: trade_id.to_string(),
            attempts,
        })
    }
}

/// R-multiple stored on a closure; absent when the trade's risk is undefined.
fn closure_r_multiple(trade: &Trade, instrument: &Instrument, closure: &Closure) -> Option<Decimal> {
    match pnl::r_multiple(trade, instrument, closure) {
        Ok(r) => Some(r),
        Err(e) => {
            debug!("No R-multiple for closure on trade {}: {}", trade.id, e);
            None
        }
    }
}

fn planned_closure(change: ClosureChange) -> Result<Closure> {
    match change {
        ClosureChange::Insert(closure) | ClosureChange::Update(closure) => Ok(closure),
        ClosureChange::Delete { closure_id } => Err(JournalError::ClosureNotFound(closure_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::SqliteStore;
    use crate::types::{AssetClass, Direction, TradeStatus};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request() -> NewTrade {
        NewTrade {
            symbol: "NVDA".to_string(),
            asset_class: AssetClass::Stock,
            direction: Direction::Long,
            entry_price: dec!(100),
            position_size: dec!(10),
            initial_stop_loss: Some(dec!(95)),
            take_profit: Some(dec!(110)),
        }
    }

    /// Wraps a real store and fails the first `conflicts` commits.
    struct ConflictingStore {
        inner: SqliteStore,
        conflicts: AtomicU32,
        commits_seen: AtomicU32,
    }

    impl ConflictingStore {
        fn new(conflicts: u32) -> Self {
            Self {
                inner: SqliteStore::new_in_memory().unwrap(),
                conflicts: AtomicU32::new(conflicts),
                commits_seen: AtomicU32::new(0),
            }
        }
    }

    impl TradeStore for ConflictingStore {
        fn save_instrument(&self, instrument: &Instrument) -> Result<()> {
            self.inner.save_instrument(instrument)
        }
        fn get_instrument(&self, symbol: &str) -> Result<Option<Instrument>> {
            self.inner.get_instrument(symbol)
        }
        fn list_instruments(&self) -> Result<Vec<Instrument>> {
            self.inner.list_instruments()
        }
        fn insert_trade(&self, trade: &Trade) -> Result<()> {
            self.inner.insert_trade(trade)
        }
        fn get_trade(&self, trade_id: &str) -> Result<Option<Trade>> {
            self.inner.get_trade(trade_id)
        }
        fn list_trades(&self) -> Result<Vec<Trade>> {
            self.inner.list_trades()
        }
        fn update_trade_levels(
            &self,
            trade_id: &str,
            expected_version: i64,
            initial_stop_loss: Option<Decimal>,
            take_profit: Option<Decimal>,
        ) -> Result<Trade> {
            self.inner
                .update_trade_levels(trade_id, expected_version, initial_stop_loss, take_profit)
        }
        fn delete_trade(&self, trade_id: &str) -> Result<bool> {
            self.inner.delete_trade(trade_id)
        }
        fn load_position(&self, trade_id: &str) -> Result<Option<PositionSnapshot>> {
            self.inner.load_position(trade_id)
        }
        fn commit_closure_change(&self, commit: &ClosureCommit) -> Result<Trade> {
            self.commits_seen.fetch_add(1, Ordering::SeqCst);
            let remaining = self.conflicts.load(Ordering::SeqCst);
            if remaining > 0 {
                self.conflicts.store(remaining - 1, Ordering::SeqCst);
                return Err(JournalError::ConcurrentModification {
                    trade_id: commit.trade_id.clone(),
                    attempts: 1,
                });
            }
            self.inner.commit_closure_change(commit)
        }
    }

    #[test]
    fn test_add_closure_records_r_multiple() {
        let journal =
            JournalService::new(Arc::new(SqliteStore::new_in_memory().unwrap()), JournalConfig::default())
                .unwrap();
        let trade = journal.open_trade(request()).unwrap();

        let outcome = journal.add_closure(&trade.id, dec!(105), dec!(4)).unwrap();
        assert_eq!(outcome.closure.r_multiple, Some(dec!(1)));
        assert_eq!(outcome.trade.status, TradeStatus::Partial);
        assert_eq!(outcome.trade.remaining_size, dec!(6));
    }

    #[test]
    fn test_closure_without_stop_has_no_r() {
        let journal =
            JournalService::new(Arc::new(SqliteStore::new_in_memory().unwrap()), JournalConfig::default())
                .unwrap();
        let mut req = request();
        req.initial_stop_loss = None;
        let trade = journal.open_trade(req).unwrap();

        let outcome = journal.add_closure(&trade.id, dec!(105), dec!(10)).unwrap();
        assert!(outcome.closure.r_multiple.is_none());
        assert_eq!(outcome.trade.status, TradeStatus::Closed);
    }

    #[test]
    fn test_retry_recovers_from_transient_conflict() {
        let store = Arc::new(ConflictingStore::new(2));
        let journal = JournalService::new(store.clone(), JournalConfig::default()).unwrap();
        let trade = journal.open_trade(request()).unwrap();

        let outcome = journal.add_closure(&trade.id, dec!(101), dec!(2)).unwrap();
        assert_eq!(outcome.trade.remaining_size, dec!(8));
        assert_eq!(store.commits_seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retries_exhausted_surfaces_conflict() {
        let store = Arc::new(ConflictingStore::new(10));
        let config = JournalConfig {
            max_mutation_retries: 2,
            ..JournalConfig::default()
        };
        let journal = JournalService::new(store.clone(), config).unwrap();
        let trade = journal.open_trade(request()).unwrap();

        let err = journal.add_closure(&trade.id, dec!(101), dec!(2)).unwrap_err();
        assert_eq!(
            err,
            JournalError::ConcurrentModification {
                trade_id: trade.id.clone(),
                attempts: 3
            }
        );
        assert_eq!(store.commits_seen.load(Ordering::SeqCst), 3);

        let stored = journal.get_trade(&trade.id).unwrap();
        assert_eq!(stored.status, TradeStatus::Open);
        assert!(journal.closures(&trade.id).unwrap().is_empty());
    }

    #[test]
    fn test_validation_errors_are_not_retried() {
        let store = Arc::new(ConflictingStore::new(0));
        let journal = JournalService::new(store.clone(), JournalConfig::default()).unwrap();
        let trade = journal.open_trade(request()).unwrap();

        let err = journal.add_closure(&trade.id, dec!(101), dec!(11)).unwrap_err();
        assert!(matches!(err, JournalError::ExceedsPositionSize { .. }));
        assert_eq!(store.commits_seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_register_instrument_rejects_half_tick_data() {
        let journal =
            JournalService::new(Arc::new(SqliteStore::new_in_memory().unwrap()), JournalConfig::default())
                .unwrap();
        let mut broken = Instrument::linear("ES", AssetClass::Futures);
        broken.tick_size = Some(dec!(0.25));
        assert!(matches!(
            journal.register_instrument(broken),
            Err(JournalError::InvalidInstrumentData { .. })
        ));
        assert!(journal.instruments().is_empty());
    }

    #[test]
    fn test_instruments_loaded_from_store() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        store
            .save_instrument(&Instrument::linear("EURUSD", AssetClass::Forex))
            .unwrap();
        let journal = JournalService::new(store, JournalConfig::default()).unwrap();
        assert!(journal.instruments().get("eurusd").is_some());
    }

    #[test]
    fn test_modify_levels_validates() {
        let journal =
            JournalService::new(Arc::new(SqliteStore::new_in_memory().unwrap()), JournalConfig::default())
                .unwrap();
        let trade = journal.open_trade(request()).unwrap();
        assert!(matches!(
            journal.modify_levels(&trade.id, Some(dec!(-1)), None),
            Err(JournalError::InvalidTrade(_))
        ));
        let updated = journal.modify_levels(&trade.id, Some(dec!(97)), None).unwrap();
        assert_eq!(updated.initial_stop_loss, Some(dec!(97)));
        assert!(updated.take_profit.is_none());
    }
}
