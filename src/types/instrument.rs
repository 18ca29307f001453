//! Instrument Types
//!
//! Tradable symbols and the pricing convention used to turn price moves into dollars.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Asset class of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    /// Equities and ETFs
    Stock,
    /// Cryptocurrency spot
    Crypto,
    /// Foreign exchange
    Forex,
    /// Tick-priced futures contracts
    Futures,
    /// Options, sized in premium units
    Options,
}

impl AssetClass {
    /// Whether price moves are converted through tick size and tick value.
    pub fn is_futures(&self) -> bool {
        matches!(self, AssetClass::Futures)
    }
}

impl std::fmt::Display for AssetClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetClass::Stock => write!(f, "stock"),
            AssetClass::Crypto => write!(f, "crypto"),
            AssetClass::Forex => write!(f, "forex"),
            AssetClass::Futures => write!(f, "futures"),
            AssetClass::Options => write!(f, "options"),
        }
    }
}

impl std::str::FromStr for AssetClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stock" => Ok(AssetClass::Stock),
            "crypto" => Ok(AssetClass::Crypto),
            "forex" => Ok(AssetClass::Forex),
            "futures" => Ok(AssetClass::Futures),
            "options" => Ok(AssetClass::Options),
            other => Err(format!("unknown asset class: {}", other)),
        }
    }
}

/// Contract spec for a tick-priced instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSpec {
    /// Minimum price increment
    pub tick_size: Decimal,
    /// Dollar value of one tick per contract
    pub tick_value: Decimal,
}

impl TickSpec {
    pub fn new(tick_size: Decimal, tick_value: Decimal) -> Self {
        Self { tick_size, tick_value }
    }

    /// Both increments must be strictly positive to be usable.
    pub fn is_valid(&self) -> bool {
        self.tick_size > Decimal::ZERO && self.tick_value > Decimal::ZERO
    }

    /// Dollar value of a one point move per contract.
    pub fn point_value(&self) -> Decimal {
        self.tick_value
            .checked_div(self.tick_size)
            .unwrap_or(Decimal::ZERO)
    }
}

/// A tradable symbol and its pricing convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    /// Symbol, unique within a user's instrument set
    pub symbol: String,
    /// Asset class
    pub asset_class: AssetClass,
    /// Minimum price increment (futures only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_size: Option<Decimal>,
    /// Dollar value of one tick per contract (futures only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_value: Option<Decimal>,
}

impl Instrument {
    /// An instrument whose price differences map to dollars 1:1 per unit.
    pub fn linear(symbol: impl Into<String>, asset_class: AssetClass) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class,
            tick_size: None,
            tick_value: None,
        }
    }

    /// A futures contract with explicit tick metadata.
    pub fn futures(symbol: impl Into<String>, spec: TickSpec) -> Self {
        Self {
            symbol: symbol.into(),
            asset_class: AssetClass::Futures,
            tick_size: Some(spec.tick_size),
            tick_value: Some(spec.tick_value),
        }
    }

    /// The tick spec, if both halves are present and positive.
    pub fn tick_spec(&self) -> Option<TickSpec> {
        match (self.tick_size, self.tick_value) {
            (Some(tick_size), Some(tick_value)) => {
                let spec = TickSpec::new(tick_size, tick_value);
                spec.is_valid().then_some(spec)
            }
            _ => None,
        }
    }

    /// Fill in missing tick metadata without overwriting explicit values.
    pub fn with_fallback(mut self, spec: TickSpec) -> Self {
        if self.tick_spec().is_none() {
            self.tick_size = Some(spec.tick_size);
            self.tick_value = Some(spec.tick_value);
        }
        self
    }
}
