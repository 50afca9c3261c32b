//! Universe of instruments for a run and loading of their price history.
//!
//! Parses symbol lists from configuration, fetches each series through the
//! price port and prepares it for its asset class. Symbols whose data is
//! unusable are skipped or abort the run depending on policy.

use crate::domain::error::ChaintraderError;
use crate::domain::expiry::front_month_expiry;
use crate::domain::instrument::{AssetClass, Instrument};
use crate::domain::price_series::{PriceSeries, build_unified_timeline};
use crate::ports::price_port::PricePort;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct Universe {
    pub asset_class: AssetClass,
    pub symbols: Vec<String>,
}

impl Universe {
    pub fn new(asset_class: AssetClass, symbols: Vec<String>) -> Self {
        Universe {
            asset_class,
            symbols,
        }
    }

    pub fn parse(asset_class: AssetClass, input: &str) -> Result<Self, UniverseError> {
        Ok(Universe::new(asset_class, parse_symbols(input)?))
    }

    pub fn count(&self) -> usize {
        self.symbols.len()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

/// What to do when one symbol's data cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingDataPolicy {
    #[default]
    Skip,
    Abort,
}

impl fmt::Display for MissingDataPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingDataPolicy::Skip => write!(f, "skip"),
            MissingDataPolicy::Abort => write!(f, "abort"),
        }
    }
}

impl FromStr for MissingDataPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" => Ok(MissingDataPolicy::Skip),
            "abort" => Ok(MissingDataPolicy::Abort),
            other => Err(format!("unknown missing-data policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: String,
}

/// Universe with each surviving symbol's prepared price series.
#[derive(Debug, Clone)]
pub struct LoadedUniverse {
    pub asset_class: AssetClass,
    pub series: BTreeMap<String, PriceSeries>,
    pub skipped: Vec<SkippedSymbol>,
}

impl LoadedUniverse {
    pub fn count(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn instrument(&self, symbol: &str) -> Instrument {
        Instrument::new(symbol, self.asset_class, None)
    }

    /// Trading dates: every observation date within `[start, end]`.
    pub fn timeline(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        build_unified_timeline(self.series.values())
            .into_iter()
            .filter(|d| *d >= start && *d <= end)
            .collect()
    }
}

/// Check a fetched series against its asset class. Commodity rows missing an
/// expiry get the front-month expiry for their date.
fn prepare_series(
    series: PriceSeries,
    asset_class: AssetClass,
) -> Result<PriceSeries, ChaintraderError> {
    if series.is_empty() {
        return Err(ChaintraderError::DataUnavailable {
            symbol: series.symbol().to_string(),
            reason: "no observations in range".to_string(),
        });
    }

    match asset_class {
        AssetClass::Equity if series.has_expiry_annotations() => {
            Err(ChaintraderError::InvalidSeries {
                symbol: series.symbol().to_string(),
                reason: "equity rows must not carry an expiry date".to_string(),
            })
        }
        AssetClass::Equity => Ok(series),
        AssetClass::CommodityFuture => {
            let symbol = series.symbol().to_string();
            series.annotate_expiry(|date| front_month_expiry(&symbol, date))
        }
    }
}

pub fn load_universe(
    price_port: &dyn PricePort,
    universe: &Universe,
    start_date: NaiveDate,
    end_date: NaiveDate,
    policy: MissingDataPolicy,
) -> Result<LoadedUniverse, ChaintraderError> {
    let mut series = BTreeMap::new();
    let mut skipped = Vec::new();

    for symbol in &universe.symbols {
        let prepared = price_port
            .fetch(symbol, start_date, end_date)
            .and_then(|s| prepare_series(s, universe.asset_class));

        match prepared {
            Ok(s) => {
                tracing::debug!(%symbol, observations = s.len(), "loaded price series");
                series.insert(symbol.clone(), s);
            }
            Err(e) if e.is_recoverable() && policy == MissingDataPolicy::Skip => {
                tracing::warn!(%symbol, error = %e, "skipping symbol");
                skipped.push(SkippedSymbol {
                    symbol: symbol.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    if !skipped.is_empty() {
        tracing::info!(
            loaded = series.len(),
            requested = universe.count(),
            "universe loaded with skipped symbols"
        );
    }

    Ok(LoadedUniverse {
        asset_class: universe.asset_class,
        series,
        skipped,
    })
}
