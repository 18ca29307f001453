//! Trade summaries and journal statistics.

use crate::error::{JournalError, Result};
use crate::services::ledger;
use crate::services::pnl;
use crate::types::{Closure, Instrument, JournalStats, Trade, TradeSummary};
use rust_decimal::Decimal;
use tracing::warn;

/// Compute every display value for one trade.
///
/// Risk-derived fields are `None` when the trade has no usable stop.
pub fn summarize(trade: &Trade, instrument: &Instrument, closures: &[Closure]) -> Result<TradeSummary> {
    trade.check_invariants()?;

    if !closures.is_empty() && trade.exit_price.is_some() {
        warn!(
            "Trade {} has closure rows and a legacy exit price; ignoring the exit price",
            trade.id
        );
    }

    let pnl = pnl::aggregate_pnl(trade, instrument, closures)?;
    let risk_per_unit = optional_risk(pnl::risk_per_unit(trade, instrument))?;
    let r_multiple = match risk_per_unit {
        Some(_) => pnl::trade_r_multiple(trade, instrument, closures)?,
        None => None,
    };
    let risk_reward = pnl::risk_reward_ratio(trade, instrument)?;

    // Closure rows are authoritative; legacy trades keep their stored size
    let (remaining_size, status) = if closures.is_empty() {
        (trade.remaining_size, trade.status)
    } else {
        let total = ledger::total_closed(closures) + ledger::unrecorded_closed(trade, closures);
        let remaining = ledger::remaining_size(trade.position_size, total);
        (remaining, ledger::derive_status(remaining, total))
    };

    Ok(TradeSummary {
        trade_id: trade.id.clone(),
        symbol: trade.symbol.clone(),
        direction: trade.direction,
        status,
        position_size: trade.position_size,
        remaining_size,
        pnl,
        r_multiple,
        risk_reward,
        risk_per_unit,
    })
}

/// Map the "R unavailable" errors to `None`.
fn optional_risk(result: Result<Decimal>) -> Result<Option<Decimal>> {
    match result {
        Ok(risk) => Ok(Some(risk)),
        Err(JournalError::MissingStopLoss { .. }) | Err(JournalError::InvalidRisk { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Aggregate statistics over trades that have been at least partially exited.
pub fn journal_stats(summaries: &[TradeSummary]) -> JournalStats {
    let mut stats = JournalStats::default();
    let mut r_total = Decimal::ZERO;
    let mut r_count = 0u64;

    for summary in summaries.iter().filter(|s| s.has_exits()) {
        stats.total_trades += 1;
        stats.net_pnl += summary.pnl;

        if summary.pnl > Decimal::ZERO {
            stats.winning_trades += 1;
            stats.gross_profit += summary.pnl;
            stats.largest_win = stats.largest_win.max(summary.pnl);
        } else if summary.pnl < Decimal::ZERO {
            stats.losing_trades += 1;
            stats.gross_loss += summary.pnl.abs();
            stats.largest_loss = stats.largest_loss.min(summary.pnl);
        } else {
            stats.breakeven_trades += 1;
        }

        if let Some(r) = summary.r_multiple {
            r_total += r;
            r_count += 1;
        }
    }

    if stats.total_trades > 0 {
        let total = Decimal::from(stats.total_trades);
        stats.win_rate_pct = Decimal::from(stats.winning_trades) * Decimal::ONE_HUNDRED / total;
        stats.expectancy = Some(stats.net_pnl / total);
    }
    if stats.gross_loss > Decimal::ZERO {
        stats.profit_factor = Some(stats.gross_profit / stats.gross_loss);
    }
    if r_count > 0 {
        stats.average_r = Some(r_total / Decimal::from(r_count));
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssetClass, Direction, NewTrade, TradeStatus};
    use rust_decimal_macros::dec;

    fn stock() -> Instrument {
        Instrument::linear("MSFT", AssetClass::Stock)
    }

    fn trade(stop: Option<Decimal>) -> Trade {
        Trade::open(NewTrade {
            symbol: "MSFT".to_string(),
            asset_class: AssetClass::Stock,
            direction: Direction::Long,
            entry_price: dec!(400),
            position_size: dec!(10),
            initial_stop_loss: stop,
            take_profit: Some(dec!(430)),
        })
        .unwrap()
    }

    fn summary(pnl: Decimal, r: Option<Decimal>) -> TradeSummary {
        TradeSummary {
            trade_id: "t".to_string(),
            symbol: "MSFT".to_string(),
            direction: Direction::Long,
            status: TradeStatus::Closed,
            position_size: dec!(1),
            remaining_size: dec!(0),
            pnl,
            r_multiple: r,
            risk_reward: None,
            risk_per_unit: None,
        }
    }

    #[test]
    fn test_summarize_partial_trade() {
        let t = trade(Some(dec!(390)));
        let closures = vec![Closure::new(t.id.clone(), dec!(420), dec!(4))];
        let s = summarize(&t, &stock(), &closures).unwrap();

        assert_eq!(s.status, TradeStatus::Partial);
        assert_eq!(s.remaining_size, dec!(6));
        assert_eq!(s.pnl, dec!(80));
        assert_eq!(s.r_multiple, Some(dec!(2)));
        assert_eq!(s.risk_reward, Some(dec!(3)));
        assert_eq!(s.risk_per_unit, Some(dec!(10)));
    }

    #[test]
    fn test_summarize_without_stop() {
        let t = trade(None);
        let closures = vec![Closure::new(t.id.clone(), dec!(390), dec!(10))];
        let s = summarize(&t, &stock(), &closures).unwrap();

        assert_eq!(s.pnl, dec!(-100));
        assert_eq!(s.status, TradeStatus::Closed);
        assert!(s.r_multiple.is_none());
        assert!(s.risk_reward.is_none());
        assert!(s.risk_per_unit.is_none());
    }

    #[test]
    fn test_for_display_rounds() {
        let t = trade(Some(dec!(397)));
        let closures = vec![Closure::new(t.id.clone(), dec!(401), dec!(10))];
        let s = summarize(&t, &stock(), &closures).unwrap().for_display();
        assert_eq!(s.r_multiple, Some(dec!(0.33)));
        assert_eq!(s.risk_reward, Some(dec!(10)));
    }

    #[test]
    fn test_journal_stats() {
        let mut open = summary(dec!(0), None);
        open.remaining_size = dec!(1);
        open.status = TradeStatus::Open;

        let summaries = vec![
            summary(dec!(300), Some(dec!(3))),
            summary(dec!(100), Some(dec!(1))),
            summary(dec!(-100), Some(dec!(-1))),
            summary(dec!(0), None),
            open,
        ];
        let stats = journal_stats(&summaries);

        assert_eq!(stats.total_trades, 4);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 1);
        assert_eq!(stats.breakeven_trades, 1);
        assert_eq!(stats.win_rate_pct, dec!(50));
        assert_eq!(stats.gross_profit, dec!(400));
        assert_eq!(stats.gross_loss, dec!(100));
        assert_eq!(stats.net_pnl, dec!(300));
        assert_eq!(stats.profit_factor, Some(dec!(4)));
        assert_eq!(stats.average_r, Some(dec!(1)));
        assert_eq!(stats.expectancy, Some(dec!(75)));
        assert_eq!(stats.largest_win, dec!(300));
        assert_eq!(stats.largest_loss, dec!(-100));
    }

    #[test]
    fn test_journal_stats_empty() {
        let stats = journal_stats(&[]);
        assert_eq!(stats, JournalStats::default());
        assert!(stats.profit_factor.is_none());
    }
}
