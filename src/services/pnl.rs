//! P&L Engine
//!
//! Pure functions that turn trades and closures into profit/loss, risk and
//! R-multiples. No I/O and no shared state: every function takes immutable
//! inputs and returns a new value, so they are safe to call from any thread.
//!
//! Price moves convert to dollars in one of two ways:
//! - futures: `|move| / tick_size * tick_value * size`
//! - everything else: `|move| * size`
//!
//! The sign of the result always follows the sign of the move.

use crate::error::{JournalError, Result};
use crate::types::{Closure, Instrument, Trade, TradeStatus};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

/// Decimal places used when values are rounded for display.
pub const DISPLAY_DP: u32 = 2;

/// Signed dollar value of a price move over `size` units.
pub fn price_to_dollars(instrument: &Instrument, price_move: Decimal, size: Decimal) -> Result<Decimal> {
    let magnitude = if instrument.asset_class.is_futures() {
        let spec = instrument
            .tick_spec()
            .ok_or_else(|| JournalError::InvalidInstrumentData {
                symbol: instrument.symbol.clone(),
            })?;
        price_move
            .abs()
            .checked_div(spec.tick_size)
            .and_then(|ticks| ticks.checked_mul(spec.tick_value))
            .and_then(|per_unit| per_unit.checked_mul(size))
            .ok_or_else(|| overflow("dollar value"))?
    } else {
        price_move
            .abs()
            .checked_mul(size)
            .ok_or_else(|| overflow("dollar value"))?
    };

    Ok(if price_move.is_sign_negative() {
        -magnitude
    } else {
        magnitude
    })
}

/// Dollar amount of moving from `price_b` to `price_a` over `size` units.
pub fn dollar_delta(
    instrument: &Instrument,
    price_a: Decimal,
    price_b: Decimal,
    size: Decimal,
) -> Result<Decimal> {
    let price_move = price_a.checked_sub(price_b).ok_or_else(|| overflow("price move"))?;
    price_to_dollars(instrument, price_move, size)
}

/// Realized P&L of one closure. Positive when price moved in the trade's favour.
pub fn closure_pnl(trade: &Trade, instrument: &Instrument, closure: &Closure) -> Result<Decimal> {
    trade.check_invariants()?;
    let signed_move = trade.direction.sign()
        * closure
            .close_price
            .checked_sub(trade.entry_price)
            .ok_or_else(|| overflow("price move"))?;
    price_to_dollars(instrument, signed_move, closure.closed_size)
}

/// Total realized P&L over a trade's closures.
///
/// Trades closed before closures were recorded as separate rows only carry an
/// `exit_price`. For those (status closed, no closures) a single synthetic
/// closure at `exit_price` over the closed size stands in.
pub fn aggregate_pnl(trade: &Trade, instrument: &Instrument, closures: &[Closure]) -> Result<Decimal> {
    trade.check_invariants()?;

    if closures.is_empty() {
        return match legacy_closure(trade) {
            Some(synthetic) => {
                debug!("Using legacy exit price for trade {}", trade.id);
                closure_pnl(trade, instrument, &synthetic)
            }
            None => Ok(Decimal::ZERO),
        };
    }

    closures
        .iter()
        .try_fold(Decimal::ZERO, |total, closure| {
            total
                .checked_add(closure_pnl(trade, instrument, closure)?)
                .ok_or_else(|| overflow("aggregate P&L"))
        })
}

/// Synthetic closure for trades fully closed through the legacy `exit_price` field.
pub fn legacy_closure(trade: &Trade) -> Option<Closure> {
    if trade.status != TradeStatus::Closed {
        return None;
    }
    let exit_price = trade.exit_price?;
    let closed_size = trade.closed_size();
    if closed_size <= Decimal::ZERO {
        return None;
    }
    let mut closure = Closure::new(trade.id.clone(), exit_price, closed_size);
    closure.id = format!("legacy-{}", trade.id);
    closure.closed_at = trade.updated_at;
    Some(closure)
}

/// Dollar risk per unit of size between entry and the initial stop.
pub fn risk_per_unit(trade: &Trade, instrument: &Instrument) -> Result<Decimal> {
    trade.check_invariants()?;
    let stop = trade
        .initial_stop_loss
        .ok_or_else(|| JournalError::MissingStopLoss {
            trade_id: trade.id.clone(),
        })?;

    let raw_risk = trade.direction.sign()
        * trade
            .entry_price
            .checked_sub(stop)
            .ok_or_else(|| overflow("risk distance"))?;
    let risk = price_to_dollars(instrument, raw_risk.abs(), Decimal::ONE)?;
    if risk.is_zero() {
        return Err(JournalError::InvalidRisk {
            trade_id: trade.id.clone(),
        });
    }
    Ok(risk)
}

/// Closure P&L per unit divided by risk per unit, at full precision.
pub fn r_multiple(trade: &Trade, instrument: &Instrument, closure: &Closure) -> Result<Decimal> {
    let per_unit_risk = risk_per_unit(trade, instrument)?;
    if closure.closed_size <= Decimal::ZERO {
        return Err(JournalError::InvalidClosure(format!(
            "closed size must be positive, got {}",
            closure.closed_size
        )));
    }
    closure_pnl(trade, instrument, closure)?
        .checked_div(closure.closed_size)
        .and_then(|per_unit_profit| per_unit_profit.checked_div(per_unit_risk))
        .ok_or_else(|| overflow("R-multiple"))
}

/// R-multiple of everything closed so far, weighted by closed size.
///
/// `None` when nothing has been closed.
pub fn trade_r_multiple(
    trade: &Trade,
    instrument: &Instrument,
    closures: &[Closure],
) -> Result<Option<Decimal>> {
    let per_unit_risk = risk_per_unit(trade, instrument)?;
    let closed: Decimal = if closures.is_empty() {
        legacy_closure(trade)
            .map(|c| c.closed_size)
            .unwrap_or(Decimal::ZERO)
    } else {
        closures.iter().map(|c| c.closed_size).sum()
    };
    if closed <= Decimal::ZERO {
        return Ok(None);
    }
    let pnl = aggregate_pnl(trade, instrument, closures)?;
    per_unit_risk
        .checked_mul(closed)
        .and_then(|total_risk| pnl.checked_div(total_risk))
        .map(Some)
        .ok_or_else(|| overflow("R-multiple"))
}

/// Planned reward / risk. `None` without a target or when risk is unavailable.
pub fn risk_reward_ratio(trade: &Trade, instrument: &Instrument) -> Result<Option<Decimal>> {
    let take_profit = match trade.take_profit {
        Some(tp) => tp,
        None => return Ok(None),
    };
    let risk = match risk_per_unit(trade, instrument) {
        Ok(risk) => risk,
        Err(JournalError::MissingStopLoss { .. }) | Err(JournalError::InvalidRisk { .. }) => {
            return Ok(None)
        }
        Err(e) => return Err(e),
    };
    let reward = dollar_delta(instrument, take_profit, trade.entry_price, Decimal::ONE)?.abs();
    reward
        .checked_div(risk)
        .map(Some)
        .ok_or_else(|| overflow("risk/reward"))
}

/// Position size that risks `risk_amount` dollars between entry and stop.
pub fn position_size_for_risk(
    trade: &Trade,
    instrument: &Instrument,
    risk_amount: Decimal,
) -> Result<Decimal> {
    let per_unit_risk = risk_per_unit(trade, instrument)?;
    risk_amount
        .abs()
        .checked_div(per_unit_risk)
        .ok_or_else(|| overflow("position size"))
}

fn overflow(what: &str) -> JournalError {
    JournalError::InvalidTrade(format!("{} exceeds the decimal range", what))
}

/// Round to [`DISPLAY_DP`] places, midpoint away from zero.
pub fn round_display(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DISPLAY_DP, RoundingStrategy::MidpointAwayFromZero)
}
