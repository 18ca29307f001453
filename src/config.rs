use crate::services::tick_table::TickTable;
use crate::types::TickSpec;
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

/// A tick spec supplied through configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOverride {
    /// Futures root or full contract symbol.
    pub symbol: String,
    /// Contract spec.
    pub spec: TickSpec,
}

/// Journal behaviour configuration.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Extra attempts after an optimistic-concurrency conflict.
    pub max_mutation_retries: u32,
    /// Whether futures without explicit tick data may use the built-in table.
    pub use_fallback_tick_table: bool,
    /// Entries added to (or replacing entries in) the fallback table.
    pub tick_overrides: Vec<TickOverride>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            max_mutation_retries: 3,
            use_fallback_tick_table: true,
            tick_overrides: Vec::new(),
        }
    }
}

impl JournalConfig {
    /// The fallback tick table this configuration describes, or `None` if disabled.
    ///
    /// Overrides apply even on top of an otherwise empty table.
    pub fn tick_table(&self) -> Option<TickTable> {
        if !self.use_fallback_tick_table && self.tick_overrides.is_empty() {
            return None;
        }
        let mut table = if self.use_fallback_tick_table {
            TickTable::standard()
        } else {
            TickTable::empty()
        };
        for entry in &self.tick_overrides {
            table.insert(&entry.symbol, entry.spec);
        }
        Some(table)
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path.
    pub database_path: String,
    /// Journal configuration.
    pub journal: JournalConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        // Format: "SYM|tick_size|tick_value,SYM2|tick_size2|tick_value2"
        let tick_overrides = env::var("FUTURES_TICK_OVERRIDES")
            .ok()
            .map(|s| parse_tick_overrides(&s))
            .unwrap_or_default();

        Self {
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "tally.db".to_string()),
            journal: JournalConfig {
                max_mutation_retries: env::var("MUTATION_MAX_RETRIES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3),
                use_fallback_tick_table: env::var("USE_FALLBACK_TICK_TABLE")
                    .ok()
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(true),
                tick_overrides,
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Parse `SYM|tick_size|tick_value` entries, skipping malformed or non-positive ones.
pub fn parse_tick_overrides(raw: &str) -> Vec<TickOverride> {
    raw.split(',')
        .filter_map(|entry| {
            let parts: Vec<&str> = entry.split('|').map(str::trim).collect();
            if parts.len() < 3 || parts[0].is_empty() {
                return None;
            }
            let tick_size = Decimal::from_str(parts[1]).ok()?;
            let tick_value = Decimal::from_str(parts[2]).ok()?;
            let spec = TickSpec::new(tick_size, tick_value);
            spec.is_valid().then(|| TickOverride {
                symbol: parts[0].to_string(),
                spec,
            })
        })
        .collect()
}
