//! SQLite persistence for the trade journal.
//!
//! Tables:
//! - `instruments`: symbol, asset class and optional tick metadata
//! - `trades`: one row per position lifecycle, with a `version` column used
//!   for optimistic concurrency
//! - `trade_closures`: exits, deleted with their trade
//!
//! Decimals are stored as TEXT so no precision is lost.

use crate::error::{JournalError, Result};
use crate::services::ledger::ClosureChange;
use crate::services::store::{ClosureCommit, PositionSnapshot, TradeStore};
use crate::services::tick_table::normalize_symbol;
use crate::types::{Closure, Instrument, Trade};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

const TRADE_COLUMNS: &str = "id, symbol, asset_class, direction, entry_price, position_size,
    initial_stop_loss, take_profit, exit_price, status, remaining_size, version,
    created_at, updated_at";

const CLOSURE_COLUMNS: &str = "id, trade_id, close_price, closed_size, r_multiple, closed_at";

/// SQLite-backed [`TradeStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| JournalError::Database("connection lock poisoned".to_string()))
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS instruments (
                symbol TEXT PRIMARY KEY,
                asset_class TEXT NOT NULL,
                tick_size TEXT,
                tick_value TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                asset_class TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                position_size TEXT NOT NULL,
                initial_stop_loss TEXT,
                take_profit TEXT,
                exit_price TEXT,
                status TEXT NOT NULL,
                remaining_size TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trade_closures (
                id TEXT PRIMARY KEY,
                trade_id TEXT NOT NULL REFERENCES trades(id) ON DELETE CASCADE,
                close_price TEXT NOT NULL,
                closed_size TEXT NOT NULL,
                r_multiple TEXT,
                closed_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_closures_trade_id ON trade_closures(trade_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_created_at ON trades(created_at)",
            [],
        )?;

        info!("SQLite schema initialized");
        Ok(())
    }

    /// Write a trade exactly as given, including status, remaining size and
    /// legacy exit price. Used when importing trades recorded elsewhere.
    pub fn import_trade(&self, trade: &Trade) -> Result<()> {
        trade.check_invariants()?;
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO trades ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                TRADE_COLUMNS
            ),
            params![
                trade.id,
                trade.symbol,
                trade.asset_class.to_string(),
                trade.direction.to_string(),
                trade.entry_price.to_string(),
                trade.position_size.to_string(),
                trade.initial_stop_loss.map(|d| d.to_string()),
                trade.take_profit.map(|d| d.to_string()),
                trade.exit_price.map(|d| d.to_string()),
                trade.status.to_string(),
                trade.remaining_size.to_string(),
                trade.version,
                trade.created_at,
                trade.updated_at,
            ],
        )?;
        debug!("Stored trade {} ({})", trade.id, trade.symbol);
        Ok(())
    }

    /// Number of stored closures across all trades.
    pub fn closure_count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM trade_closures", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl TradeStore for SqliteStore {
    fn save_instrument(&self, instrument: &Instrument) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO instruments (symbol, asset_class, tick_size, tick_value)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(symbol) DO UPDATE SET
                asset_class = excluded.asset_class,
                tick_size = excluded.tick_size,
                tick_value = excluded.tick_value",
            params![
                normalize_symbol(&instrument.symbol),
                instrument.asset_class.to_string(),
                instrument.tick_size.map(|d| d.to_string()),
                instrument.tick_value.map(|d| d.to_string()),
            ],
        )?;
        debug!("Saved instrument {}", instrument.symbol);
        Ok(())
    }

    fn get_instrument(&self, symbol: &str) -> Result<Option<Instrument>> {
        let conn = self.conn()?;
        let instrument = conn
            .query_row(
                "SELECT symbol, asset_class, tick_size, tick_value FROM instruments WHERE symbol = ?1",
                params![normalize_symbol(symbol)],
                instrument_from_row,
            )
            .optional()?;
        Ok(instrument)
    }

    fn list_instruments(&self) -> Result<Vec<Instrument>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT symbol, asset_class, tick_size, tick_value FROM instruments ORDER BY symbol",
        )?;
        let instruments = stmt
            .query_map([], instrument_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(instruments)
    }

    fn insert_trade(&self, trade: &Trade) -> Result<()> {
        self.import_trade(trade)
    }

    fn get_trade(&self, trade_id: &str) -> Result<Option<Trade>> {
        let conn = self.conn()?;
        read_trade(&conn, trade_id)
    }

    fn list_trades(&self) -> Result<Vec<Trade>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM trades ORDER BY created_at, id",
            TRADE_COLUMNS
        ))?;
        let trades = stmt
            .query_map([], trade_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(trades)
    }

    fn update_trade_levels(
        &self,
        trade_id: &str,
        expected_version: i64,
        initial_stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<Trade> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = chrono::Utc::now().timestamp_millis();

        let updated = tx.execute(
            "UPDATE trades SET initial_stop_loss = ?1, take_profit = ?2,
                version = version + 1, updated_at = ?3
             WHERE id = ?4 AND version = ?5",
            params![
                initial_stop_loss.map(|d| d.to_string()),
                take_profit.map(|d| d.to_string()),
                now,
                trade_id,
                expected_version,
            ],
        )?;
        if updated == 0 {
            return Err(version_mismatch(&tx, trade_id)?);
        }

        let trade = read_trade(&tx, trade_id)?
            .ok_or_else(|| JournalError::TradeNotFound(trade_id.to_string()))?;
        tx.commit()?;
        Ok(trade)
    }

    fn delete_trade(&self, trade_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM trades WHERE id = ?1", params![trade_id])?;
        if deleted > 0 {
            info!("Deleted trade {} and its closures", trade_id);
        }
        Ok(deleted > 0)
    }

    fn load_position(&self, trade_id: &str) -> Result<Option<PositionSnapshot>> {
        let mut conn = self.conn()?;
        // One read transaction so the trade row and closures come from the same state
        let tx = conn.transaction()?;
        let trade = match read_trade(&tx, trade_id)? {
            Some(trade) => trade,
            None => return Ok(None),
        };

        let closures = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {} FROM trade_closures WHERE trade_id = ?1 ORDER BY closed_at, rowid",
                CLOSURE_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![trade_id], closure_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        tx.commit()?;

        Ok(Some(PositionSnapshot { trade, closures }))
    }

    fn commit_closure_change(&self, commit: &ClosureCommit) -> Result<Trade> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = chrono::Utc::now().timestamp_millis();

        let updated = tx.execute(
            "UPDATE trades SET remaining_size = ?1, status = ?2,
                version = version + 1, updated_at = ?3
             WHERE id = ?4 AND version = ?5",
            params![
                commit.remaining_size.to_string(),
                commit.status.to_string(),
                now,
                commit.trade_id,
                commit.expected_version,
            ],
        )?;
        if updated == 0 {
            return Err(version_mismatch(&tx, &commit.trade_id)?);
        }

        match &commit.change {
            ClosureChange::Insert(closure) => {
                tx.execute(
                    &format!(
                        "INSERT INTO trade_closures ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        CLOSURE_COLUMNS
                    ),
                    params![
                        closure.id,
                        commit.trade_id,
                        closure.close_price.to_string(),
                        closure.closed_size.to_string(),
                        closure.r_multiple.map(|d| d.to_string()),
                        closure.closed_at,
                    ],
                )?;
            }
            ClosureChange::Update(closure) => {
                let changed = tx.execute(
                    "UPDATE trade_closures SET close_price = ?1, closed_size = ?2,
                        r_multiple = ?3, closed_at = ?4
                     WHERE id = ?5 AND trade_id = ?6",
                    params![
                        closure.close_price.to_string(),
                        closure.closed_size.to_string(),
                        closure.r_multiple.map(|d| d.to_string()),
                        closure.closed_at,
                        closure.id,
                        commit.trade_id,
                    ],
                )?;
                if changed == 0 {
                    return Err(JournalError::ClosureNotFound(closure.id.clone()));
                }
            }
            ClosureChange::Delete { closure_id } => {
                let changed = tx.execute(
                    "DELETE FROM trade_closures WHERE id = ?1 AND trade_id = ?2",
                    params![closure_id, commit.trade_id],
                )?;
                if changed == 0 {
                    return Err(JournalError::ClosureNotFound(closure_id.clone()));
                }
            }
        }

        let trade = read_trade(&tx, &commit.trade_id)?
            .ok_or_else(|| JournalError::TradeNotFound(commit.trade_id.clone()))?;
        tx.commit()?;

        info!(
            "Committed closure change on trade {}: remaining {} ({})",
            trade.id, trade.remaining_size, trade.status
        );
        Ok(trade)
    }
}

/// The error for a versioned update that touched no rows.
fn version_mismatch(conn: &Connection, trade_id: &str) -> Result<JournalError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM trades WHERE id = ?1)",
        params![trade_id],
        |row| row.get(0),
    )?;
    Ok(if exists {
        JournalError::ConcurrentModification {
            trade_id: trade_id.to_string(),
            attempts: 1,
        }
    } else {
        JournalError::TradeNotFound(trade_id.to_string())
    })
}

fn read_trade(conn: &Connection, trade_id: &str) -> Result<Option<Trade>> {
    let trade = conn
        .query_row(
            &format!("SELECT {} FROM trades WHERE id = ?1", TRADE_COLUMNS),
            params![trade_id],
            trade_from_row,
        )
        .optional()?;
    Ok(trade)
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<Trade> {
    Ok(Trade {
        id: row.get(0)?,
        symbol: row.get(1)?,
        asset_class: parse_at(row, 2)?,
        direction: parse_at(row, 3)?,
        entry_price: decimal_at(row, 4)?,
        position_size: decimal_at(row, 5)?,
        initial_stop_loss: opt_decimal_at(row, 6)?,
        take_profit: opt_decimal_at(row, 7)?,
        exit_price: opt_decimal_at(row, 8)?,
        status: parse_at(row, 9)?,
        remaining_size: decimal_at(row, 10)?,
        version: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn closure_from_row(row: &Row<'_>) -> rusqlite::Result<Closure> {
    Ok(Closure {
        id: row.get(0)?,
        trade_id: row.get(1)?,
        close_price: decimal_at(row, 2)?,
        closed_size: decimal_at(row, 3)?,
        r_multiple: opt_decimal_at(row, 4)?,
        closed_at: row.get(5)?,
    })
}

fn instrument_from_row(row: &Row<'_>) -> rusqlite::Result<Instrument> {
    Ok(Instrument {
        symbol: row.get(0)?,
        asset_class: parse_at(row, 1)?,
        tick_size: opt_decimal_at(row, 2)?,
        tick_value: opt_decimal_at(row, 3)?,
    })
}

fn parse_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.to_string().into())
    })
}

fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    parse_at(row, idx)
}

fn opt_decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Decimal::from_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetClass, Direction, NewTrade, TickSpec, TradeStatus};
    use rust_decimal_macros::dec;

    fn trade() -> Trade {
        Trade::open(NewTrade {
            symbol: "ES".to_string(),
            asset_class: AssetClass::Futures,
            direction: Direction::Long,
            entry_price: dec!(4500.25),
            position_size: dec!(3),
            initial_stop_loss: Some(dec!(4490)),
            take_profit: None,
        })
        .unwrap()
    }

    fn insert_commit(snapshot: &PositionSnapshot, closure: Closure, remaining: Decimal) -> ClosureCommit {
        ClosureCommit {
            trade_id: snapshot.trade.id.clone(),
            expected_version: snapshot.version(),
            change: ClosureChange::Insert(closure),
            remaining_size: remaining,
            status: TradeStatus::Partial,
        }
    }

    #[test]
    fn test_instrument_crud() {
        let store = SqliteStore::new_in_memory().unwrap();
        store
            .save_instrument(&Instrument::futures("es", TickSpec::new(dec!(0.25), dec!(12.50))))
            .unwrap();
        store
            .save_instrument(&Instrument::linear("AAPL", AssetClass::Stock))
            .unwrap();

        let es = store.get_instrument("ES").unwrap().unwrap();
        assert_eq!(es.symbol, "ES");
        assert_eq!(es.tick_value, Some(dec!(12.50)));
        assert_eq!(store.list_instruments().unwrap().len(), 2);
        assert!(store.get_instrument("NQ").unwrap().is_none());
    }

    #[test]
    fn test_trade_round_trip_preserves_decimals() {
        let store = SqliteStore::new_in_memory().unwrap();
        let t = trade();
        store.insert_trade(&t).unwrap();

        let loaded = store.get_trade(&t.id).unwrap().unwrap();
        assert_eq!(loaded, t);
        assert_eq!(store.list_trades().unwrap().len(), 1);
    }

    #[test]
    fn test_commit_updates_trade_and_closure_together() {
        let store = SqliteStore::new_in_memory().unwrap();
        let t = trade();
        store.insert_trade(&t).unwrap();

        let snapshot = store.load_position(&t.id).unwrap().unwrap();
        let closure = Closure::new(t.id.clone(), dec!(4502), dec!(1));
        let updated = store
            .commit_closure_change(&insert_commit(&snapshot, closure, dec!(2)))
            .unwrap();

        assert_eq!(updated.version, 1);
        assert_eq!(updated.remaining_size, dec!(2));
        let snapshot = store.load_position(&t.id).unwrap().unwrap();
        assert_eq!(snapshot.closures.len(), 1);
        assert_eq!(snapshot.trade.status, TradeStatus::Partial);
    }

    #[test]
    fn test_stale_version_writes_nothing() {
        let store = SqliteStore::new_in_memory().unwrap();
        let t = trade();
        store.insert_trade(&t).unwrap();

        let stale = store.load_position(&t.id).unwrap().unwrap();
        let first = Closure::new(t.id.clone(), dec!(4502), dec!(1));
        store
            .commit_closure_change(&insert_commit(&stale, first, dec!(2)))
            .unwrap();

        let second = Closure::new(t.id.clone(), dec!(4503), dec!(2));
        let err = store
            .commit_closure_change(&insert_commit(&stale, second, dec!(1)))
            .unwrap_err();
        assert!(matches!(err, JournalError::ConcurrentModification { .. }));

        let current = store.load_position(&t.id).unwrap().unwrap();
        assert_eq!(current.closures.len(), 1);
        assert_eq!(current.trade.remaining_size, dec!(2));
        assert_eq!(current.version(), 1);
    }

    #[test]
    fn test_missing_closure_rolls_back_trade_update() {
        let store = SqliteStore::new_in_memory().unwrap();
        let t = trade();
        store.insert_trade(&t).unwrap();

        let snapshot = store.load_position(&t.id).unwrap().unwrap();
        let commit = ClosureCommit {
            trade_id: t.id.clone(),
            expected_version: snapshot.version(),
            change: ClosureChange::Delete { closure_id: "missing".into() },
            remaining_size: dec!(0),
            status: TradeStatus::Closed,
        };
        assert_eq!(
            store.commit_closure_change(&commit).unwrap_err(),
            JournalError::ClosureNotFound("missing".into())
        );

        let unchanged = store.get_trade(&t.id).unwrap().unwrap();
        assert_eq!(unchanged.status, TradeStatus::Open);
        assert_eq!(unchanged.version, 0);
    }

    #[test]
    fn test_delete_trade_cascades() {
        let store = SqliteStore::new_in_memory().unwrap();
        let t = trade();
        store.insert_trade(&t).unwrap();
        let snapshot = store.load_position(&t.id).unwrap().unwrap();
        let closure = Closure::new(t.id.clone(), dec!(4502), dec!(1));
        store
            .commit_closure_change(&insert_commit(&snapshot, closure, dec!(2)))
            .unwrap();
        assert_eq!(store.closure_count().unwrap(), 1);

        assert!(store.delete_trade(&t.id).unwrap());
        assert_eq!(store.closure_count().unwrap(), 0);
        assert!(!store.delete_trade(&t.id).unwrap());
        assert!(store.load_position(&t.id).unwrap().is_none());
    }

    #[test]
    fn test_update_levels_checks_version() {
        let store = SqliteStore::new_in_memory().unwrap();
        let t = trade();
        store.insert_trade(&t).unwrap();

        let updated = store
            .update_trade_levels(&t.id, 0, Some(dec!(4495)), Some(dec!(4520)))
            .unwrap();
        assert_eq!(updated.initial_stop_loss, Some(dec!(4495)));
        assert_eq!(updated.version, 1);

        assert!(matches!(
            store.update_trade_levels(&t.id, 0, None, None),
            Err(JournalError::ConcurrentModification { .. })
        ));
        assert!(matches!(
            store.update_trade_levels("nope", 0, None, None),
            Err(JournalError::TradeNotFound(_))
        ));
    }
}
