pub mod instruments;
pub mod journal;
pub mod ledger;
pub mod pnl;
pub mod sqlite_store;
pub mod stats;
pub mod store;
pub mod tick_table;

pub use instruments::InstrumentRegistry;
pub use journal::{ClosureOutcome, JournalService};
pub use ledger::{ClosureChange, ClosurePlan};
pub use sqlite_store::SqliteStore;
pub use store::{ClosureCommit, PositionSnapshot, TradeStore};
pub use tick_table::{TickTable, TICK_TABLE_VERSION};
