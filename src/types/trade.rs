//! Trade Types
//!
//! Journal trades (one position lifecycle each) and the closures that exit them.

use crate::error::{JournalError, Result};
use crate::types::AssetClass;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "long" => Ok(Direction::Long),
            "short" => Ok(Direction::Short),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// Trade status, derived from closures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    /// Nothing closed yet
    Open,
    /// Some but not all of the position closed
    Partial,
    /// Entire position closed
    Closed,
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeStatus::Open => write!(f, "open"),
            TradeStatus::Partial => write!(f, "partial"),
            TradeStatus::Closed => write!(f, "closed"),
        }
    }
}

impl std::str::FromStr for TradeStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(TradeStatus::Open),
            "partial" => Ok(TradeStatus::Partial),
            "closed" => Ok(TradeStatus::Closed),
            other => Err(format!("unknown trade status: {}", other)),
        }
    }
}

// =============================================================================
// Trade
// =============================================================================

/// Request to log a new trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrade {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub position_size: Decimal,
    #[serde(default)]
    pub initial_stop_loss: Option<Decimal>,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
}

/// One position lifecycle in the journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Unique trade ID
    pub id: String,
    /// Symbol (references an instrument)
    pub symbol: String,
    /// Asset class chosen when the trade was logged
    pub asset_class: AssetClass,
    /// Long or short
    pub direction: Direction,
    /// Entry price
    pub entry_price: Decimal,
    /// Original position size (fractional sizes allowed)
    pub position_size: Decimal,
    /// Initial stop loss
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_stop_loss: Option<Decimal>,
    /// Profit target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    /// Single exit price written by journals that predate closure rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<Decimal>,
    /// Derived status
    pub status: TradeStatus,
    /// Size not yet closed
    pub remaining_size: Decimal,
    /// Optimistic concurrency token, bumped on every committed mutation
    #[serde(default)]
    pub version: i64,
    /// When the trade was logged (ms)
    pub created_at: i64,
    /// When the trade was last updated (ms)
    pub updated_at: i64,
}

impl Trade {
    /// Validate a request and create an open trade from it.
    pub fn open(request: NewTrade) -> Result<Self> {
        if request.symbol.trim().is_empty() {
            return Err(JournalError::InvalidTrade("symbol is required".to_string()));
        }
        if request.position_size <= Decimal::ZERO {
            return Err(JournalError::InvalidTrade(format!(
                "position size must be positive, got {}",
                request.position_size
            )));
        }
        if request.entry_price <= Decimal::ZERO {
            return Err(JournalError::InvalidTrade(format!(
                "entry price must be positive, got {}",
                request.entry_price
            )));
        }
        validate_level("stop loss", request.initial_stop_loss)?;
        validate_level("take profit", request.take_profit)?;

        let now = chrono::Utc::now().timestamp_millis();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            symbol: request.symbol.trim().to_string(),
            asset_class: request.asset_class,
            direction: request.direction,
            entry_price: request.entry_price,
            position_size: request.position_size,
            initial_stop_loss: request.initial_stop_loss,
            take_profit: request.take_profit,
            exit_price: None,
            status: TradeStatus::Open,
            remaining_size: request.position_size,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Size closed so far according to the stored remaining size.
    pub fn closed_size(&self) -> Decimal {
        self.position_size - self.remaining_size
    }

    /// Reject structurally impossible trades before any calculation touches them.
    pub fn check_invariants(&self) -> Result<()> {
        if self.position_size <= Decimal::ZERO {
            return Err(JournalError::InvalidTrade(format!(
                "trade {} has non-positive position size {}",
                self.id, self.position_size
            )));
        }
        if self.remaining_size < Decimal::ZERO || self.remaining_size > self.position_size {
            return Err(JournalError::InvalidTrade(format!(
                "trade {} has remaining size {} outside [0, {}]",
                self.id, self.remaining_size, self.position_size
            )));
        }
        Ok(())
    }
}

fn validate_level(name: &str, level: Option<Decimal>) -> Result<()> {
    match level {
        Some(price) if price <= Decimal::ZERO => Err(JournalError::InvalidTrade(format!(
            "{} must be positive, got {}",
            name, price
        ))),
        _ => Ok(()),
    }
}

// =============================================================================
// Closure
// =============================================================================

/// A partial or full exit against a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Closure {
    /// Unique closure ID
    pub id: String,
    /// Owning trade
    pub trade_id: String,
    /// Exit price
    pub close_price: Decimal,
    /// Size exited
    pub closed_size: Decimal,
    /// R-multiple computed when the closure was recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r_multiple: Option<Decimal>,
    /// When the exit happened (ms)
    pub closed_at: i64,
}

impl Closure {
    /// Create a new closure record.
    pub fn new(trade_id: impl Into<String>, close_price: Decimal, closed_size: Decimal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            trade_id: trade_id.into(),
            close_price,
            closed_size,
            r_multiple: None,
            closed_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn request() -> NewTrade {
        NewTrade {
            symbol: " AAPL ".to_string(),
            asset_class: AssetClass::Stock,
            direction: Direction::Long,
            entry_price: dec!(100),
            position_size: dec!(10),
            initial_stop_loss: Some(dec!(95)),
            take_profit: None,
        }
    }

    #[test]
    fn test_open_trade_starts_fully_open() {
        let trade = Trade::open(request()).unwrap();
        assert_eq!(trade.symbol, "AAPL");
        assert_eq!(trade.status, TradeStatus::Open);
        assert_eq!(trade.remaining_size, dec!(10));
        assert_eq!(trade.closed_size(), dec!(0));
        assert_eq!(trade.version, 0);
        assert!(trade.check_invariants().is_ok());
    }

    #[test]
    fn test_open_rejects_non_positive_size() {
        let mut req = request();
        req.position_size = dec!(-1);
        assert!(matches!(Trade::open(req), Err(JournalError::InvalidTrade(_))));
    }

    #[test]
    fn test_open_rejects_non_positive_stop() {
        let mut req = request();
        req.initial_stop_loss = Some(dec!(0));
        assert!(matches!(Trade::open(req), Err(JournalError::InvalidTrade(_))));
    }

    #[test]
    fn test_invariants_catch_drifted_remaining_size() {
        let mut trade = Trade::open(request()).unwrap();
        trade.remaining_size = dec!(11);
        assert!(trade.check_invariants().is_err());
        trade.remaining_size = dec!(-0.5);
        assert!(trade.check_invariants().is_err());
    }

    #[test]
    fn test_direction_sign() {
        assert_eq!(Direction::Long.sign(), dec!(1));
        assert_eq!(Direction::Short.sign(), dec!(-1));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&TradeStatus::Partial).unwrap(), "\"partial\"");
        assert_eq!("closed".parse::<TradeStatus>(), Ok(TradeStatus::Closed));
    }

    #[test]
    fn test_new_trade_deserializes_camel_case() {
        let json = r#"{
            "symbol": "ESZ4",
            "assetClass": "futures",
            "direction": "short",
            "entryPrice": "4500.25",
            "positionSize": "2"
        }"#;
        let req: NewTrade = serde_json::from_str(json).unwrap();
        assert_eq!(req.direction, Direction::Short);
        assert_eq!(req.entry_price, dec!(4500.25));
        assert!(req.initial_stop_loss.is_none());
    }
}
