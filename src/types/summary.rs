//! Summary Types
//!
//! Computed values handed to the display layer.

use crate::types::{Direction, TradeStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Computed results for one trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSummary {
    pub trade_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub status: TradeStatus,
    pub position_size: Decimal,
    pub remaining_size: Decimal,
    /// Realized P&L across all closures
    pub pnl: Decimal,
    /// Size-weighted R-multiple of what has been closed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r_multiple: Option<Decimal>,
    /// Planned reward / risk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_reward: Option<Decimal>,
    /// Dollar risk per unit of size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_per_unit: Option<Decimal>,
}

impl TradeSummary {
    /// Apply the display rounding policy to every monetary and ratio field.
    pub fn for_display(&self) -> Self {
        Self {
            pnl: crate::services::pnl::round_display(self.pnl),
            r_multiple: self.r_multiple.map(crate::services::pnl::round_display),
            risk_reward: self.risk_reward.map(crate::services::pnl::round_display),
            risk_per_unit: self.risk_per_unit.map(crate::services::pnl::round_display),
            ..self.clone()
        }
    }

    /// Whether any of the position has been exited.
    pub fn has_exits(&self) -> bool {
        self.remaining_size < self.position_size
    }
}

/// Journal-wide performance statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalStats {
    /// Trades with at least one exit
    pub total_trades: u64,
    pub winning_trades: u64,
    pub losing_trades: u64,
    pub breakeven_trades: u64,
    /// Winners as a percentage of total trades
    pub win_rate_pct: Decimal,
    pub gross_profit: Decimal,
    /// Sum of losses, as a positive number
    pub gross_loss: Decimal,
    pub net_pnl: Decimal,
    /// Gross profit / gross loss, absent when there are no losses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_factor: Option<Decimal>,
    /// Mean R-multiple over trades with a defined R
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_r: Option<Decimal>,
    /// Average P&L per trade
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expectancy: Option<Decimal>,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
}
