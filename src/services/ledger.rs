//! Closure Ledger
//!
//! Aggregation of a trade's closures into remaining size and status. The
//! remaining size is always recomputed from the full closure list, never
//! adjusted incrementally.

use crate::error::{JournalError, Result};
use crate::types::{Closure, Trade, TradeStatus};
use rust_decimal::Decimal;

/// A single mutation of a trade's closure set.
#[derive(Debug, Clone, PartialEq)]
pub enum ClosureChange {
    Insert(Closure),
    Update(Closure),
    Delete { closure_id: String },
}

impl ClosureChange {
    pub fn closure_id(&self) -> &str {
        match self {
            ClosureChange::Insert(c) | ClosureChange::Update(c) => &c.id,
            ClosureChange::Delete { closure_id } => closure_id,
        }
    }
}

/// The result of planning a change against a fresh closure list.
#[derive(Debug, Clone, PartialEq)]
pub struct ClosurePlan {
    pub change: ClosureChange,
    /// The closure list after the change
    pub closures: Vec<Closure>,
    pub total_closed: Decimal,
    pub remaining_size: Decimal,
    pub status: TradeStatus,
}

/// Sum of closed size.
pub fn total_closed(closures: &[Closure]) -> Decimal {
    closures.iter().map(|c| c.closed_size).sum()
}

/// Size the trade records as closed that no closure row accounts for.
///
/// Non-zero for trades closed through the legacy `exit_price` field. That
/// size stays closed across later closure mutations.
pub fn unrecorded_closed(trade: &Trade, closures: &[Closure]) -> Decimal {
    (trade.closed_size() - total_closed(closures)).max(Decimal::ZERO)
}

/// `position_size - total_closed`, clamped to `[0, position_size]`.
pub fn remaining_size(position_size: Decimal, total_closed: Decimal) -> Decimal {
    let upper = position_size.max(Decimal::ZERO);
    (position_size - total_closed).clamp(Decimal::ZERO, upper)
}

pub fn derive_status(remaining_size: Decimal, total_closed: Decimal) -> TradeStatus {
    if remaining_size.is_zero() {
        TradeStatus::Closed
    } else if total_closed > Decimal::ZERO {
        TradeStatus::Partial
    } else {
        TradeStatus::Open
    }
}

/// Check a candidate closure against the rest of the trade's closures.
///
/// `replacing` names a closure being edited; its current size does not count
/// toward what is already closed.
pub fn validate_closure(
    trade: &Trade,
    closures: &[Closure],
    candidate: &Closure,
    replacing: Option<&str>,
) -> Result<()> {
    if candidate.closed_size <= Decimal::ZERO {
        return Err(JournalError::InvalidClosure(format!(
            "closed size must be positive, got {}",
            candidate.closed_size
        )));
    }
    if candidate.close_price <= Decimal::ZERO {
        return Err(JournalError::InvalidClosure(format!(
            "close price must be positive, got {}",
            candidate.close_price
        )));
    }
    if candidate.trade_id != trade.id {
        return Err(JournalError::InvalidClosure(format!(
            "closure {} belongs to trade {}, not {}",
            candidate.id, candidate.trade_id, trade.id
        )));
    }

    let already_closed: Decimal = closures
        .iter()
        .filter(|c| Some(c.id.as_str()) != replacing)
        .map(|c| c.closed_size)
        .sum::<Decimal>()
        + unrecorded_closed(trade, closures);
    let available = remaining_size(trade.position_size, already_closed);

    if candidate.closed_size > available {
        return Err(JournalError::ExceedsPositionSize {
            requested: candidate.closed_size,
            available,
        });
    }
    Ok(())
}

/// Apply a change to a trade's current closures and derive the new trade state.
pub fn apply_change(trade: &Trade, closures: &[Closure], change: ClosureChange) -> Result<ClosurePlan> {
    trade.check_invariants()?;

    let unrecorded = unrecorded_closed(trade, closures);
    let mut next: Vec<Closure> = closures.to_vec();
    match &change {
        ClosureChange::Insert(closure) => {
            if next.iter().any(|c| c.id == closure.id) {
                return Err(JournalError::InvalidClosure(format!(
                    "closure {} already exists",
                    closure.id
                )));
            }
            validate_closure(trade, closures, closure, None)?;
            next.push(closure.clone());
        }
        ClosureChange::Update(closure) => {
            let slot = next
                .iter_mut()
                .find(|c| c.id == closure.id)
                .ok_or_else(|| JournalError::ClosureNotFound(closure.id.clone()))?;
            validate_closure(trade, closures, closure, Some(&closure.id))?;
            *slot = closure.clone();
        }
        ClosureChange::Delete { closure_id } => {
            let before = next.len();
            next.retain(|c| &c.id != closure_id);
            if next.len() == before {
                return Err(JournalError::ClosureNotFound(closure_id.clone()));
            }
        }
    }

    let total = total_closed(&next) + unrecorded;
    let remaining = remaining_size(trade.position_size, total);
    Ok(ClosurePlan {
        change,
        closures: next,
        total_closed: total,
        remaining_size: remaining,
        status: derive_status(remaining, total),
    })
}
