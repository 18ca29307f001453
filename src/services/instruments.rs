//! Instrument lookup.
//!
//! Resolves a symbol to the instrument the P&L engine should price it with.
//! Non-futures symbols that were never registered price 1:1. Futures symbols
//! take their tick metadata from the registered instrument, then from the
//! fallback tick table; when neither has it the instrument is returned without
//! tick data and the engine refuses to price it.

use crate::services::tick_table::{normalize_symbol, TickTable};
use crate::types::{AssetClass, Instrument};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// In-memory instrument set with an optional fallback tick table.
#[derive(Clone)]
pub struct InstrumentRegistry {
    /// Registered instruments (normalized symbol -> Instrument)
    instruments: Arc<DashMap<String, Instrument>>,
    /// Fallback contract specs, if enabled
    fallback: Option<Arc<TickTable>>,
}

impl InstrumentRegistry {
    /// Registry that falls back to the given tick table.
    pub fn new(fallback: TickTable) -> Self {
        Self {
            instruments: Arc::new(DashMap::new()),
            fallback: Some(Arc::new(fallback)),
        }
    }

    /// Registry that only knows explicitly registered tick metadata.
    pub fn without_fallback() -> Self {
        Self {
            instruments: Arc::new(DashMap::new()),
            fallback: None,
        }
    }

    /// Add or replace an instrument.
    pub fn register(&self, instrument: Instrument) {
        debug!("Registered instrument {} ({})", instrument.symbol, instrument.asset_class);
        self.instruments
            .insert(normalize_symbol(&instrument.symbol), instrument);
    }

    /// A registered instrument, exactly as stored.
    pub fn get(&self, symbol: &str) -> Option<Instrument> {
        self.instruments
            .get(&normalize_symbol(symbol))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// The instrument to price `symbol` with, given the asset class the trade was logged under.
    pub fn resolve(&self, symbol: &str, asset_class: AssetClass) -> Instrument {
        match self.get(symbol) {
            Some(instrument) if instrument.asset_class.is_futures() => {
                if instrument.tick_spec().is_some() {
                    return instrument;
                }
                match self.fallback_spec(symbol) {
                    Some(spec) => {
                        debug!("Filling tick data for {} from fallback table", symbol);
                        instrument.with_fallback(spec)
                    }
                    None => instrument,
                }
            }
            Some(instrument) => instrument,
            None if asset_class.is_futures() => match self.fallback_spec(symbol) {
                Some(spec) => {
                    debug!("Unregistered futures symbol {} priced from fallback table", symbol);
                    Instrument::futures(symbol, spec)
                }
                None => {
                    debug!("No tick data for futures symbol {}", symbol);
                    Instrument::linear(symbol, AssetClass::Futures)
                }
            },
            None => Instrument::linear(symbol, asset_class),
        }
    }

    fn fallback_spec(&self, symbol: &str) -> Option<crate::types::TickSpec> {
        self.fallback.as_ref().and_then(|table| table.lookup(symbol))
    }
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::new(TickTable::standard())
    }
}
