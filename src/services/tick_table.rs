//! Fallback futures contract specs.
//!
//! Used only when an instrument record carries no tick metadata of its own.
//! Symbols missing from the table are never guessed.

use crate::types::TickSpec;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Bump whenever an entry in [`STANDARD_CONTRACTS`] changes.
pub const TICK_TABLE_VERSION: u32 = 1;

/// (root symbol, tick size, tick value) as mantissa/scale pairs.
const STANDARD_CONTRACTS: &[(&str, (i64, u32), (i64, u32))] = &[
    // CME equity index
    ("ES", (25, 2), (1250, 2)),
    ("MES", (25, 2), (125, 2)),
    ("NQ", (25, 2), (500, 2)),
    ("MNQ", (25, 2), (50, 2)),
    ("YM", (1, 0), (500, 2)),
    ("MYM", (1, 0), (50, 2)),
    ("RTY", (10, 2), (500, 2)),
    ("M2K", (10, 2), (50, 2)),
    // NYMEX energy
    ("CL", (1, 2), (1000, 2)),
    ("MCL", (1, 2), (100, 2)),
    ("NG", (1, 3), (1000, 2)),
    // COMEX metals
    ("GC", (10, 2), (1000, 2)),
    ("MGC", (10, 2), (100, 2)),
    ("SI", (5, 3), (2500, 2)),
    ("HG", (5, 4), (1250, 2)),
    // CBOT rates
    ("ZB", (3125, 5), (3125, 2)),
    ("ZN", (15625, 6), (15625, 3)),
    ("ZF", (78125, 7), (78125, 4)),
    // CBOT grains
    ("ZC", (25, 2), (1250, 2)),
    ("ZS", (25, 2), (1250, 2)),
    ("ZW", (25, 2), (1250, 2)),
    // CME FX
    ("6E", (5, 5), (625, 2)),
    ("6J", (5, 7), (625, 2)),
    ("6B", (1, 4), (625, 2)),
];

const MONTH_CODES: &str = "FGHJKMNQUVXZ";

/// Map of futures root symbol to tick spec.
#[derive(Debug, Clone, Default)]
pub struct TickTable {
    specs: HashMap<String, TickSpec>,
}

impl TickTable {
    /// A table with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in table of common exchange-listed contracts.
    pub fn standard() -> Self {
        let specs = STANDARD_CONTRACTS
            .iter()
            .map(|(root, (size_m, size_s), (value_m, value_s))| {
                (
                    root.to_string(),
                    TickSpec::new(
                        Decimal::new(*size_m, *size_s),
                        Decimal::new(*value_m, *value_s),
                    ),
                )
            })
            .collect();
        Self { specs }
    }

    /// Add or replace an entry. Invalid specs are ignored.
    pub fn insert(&mut self, symbol: &str, spec: TickSpec) -> bool {
        if !spec.is_valid() {
            return false;
        }
        self.specs.insert(normalize_symbol(symbol), spec);
        true
    }

    /// Look up a symbol, falling back to its root when it carries a contract month.
    pub fn lookup(&self, symbol: &str) -> Option<TickSpec> {
        let normalized = normalize_symbol(symbol);
        if let Some(spec) = self.specs.get(&normalized) {
            return Some(*spec);
        }
        contract_root(&normalized).and_then(|root| self.specs.get(root).copied())
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Upper-case, trimmed, without a leading `/`.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().trim_start_matches('/').to_uppercase()
}

/// Strip a month code plus one or two year digits, e.g. `ESZ4` -> `ES`, `MNQH25` -> `MNQ`.
fn contract_root(symbol: &str) -> Option<&str> {
    let digits = symbol
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .count();
    if !(1..=2).contains(&digits) {
        return None;
    }
    let without_year = &symbol[..symbol.len() - digits];
    let month = without_year.chars().last()?;
    if !MONTH_CODES.contains(month) {
        return None;
    }
    let root = &without_year[..without_year.len() - 1];
    (!root.is_empty()).then_some(root)
}
