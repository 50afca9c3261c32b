//! Market quotes, daily portfolio snapshots and their tabular view.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::instrument::Instrument;
use super::position::Position;

/// An instrument as seen on a given date, with its latest price.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub instrument: Instrument,
    pub price: f64,
}

/// Quotes keyed by symbol for one simulation date.
pub type QuoteMap = BTreeMap<String, Quote>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    pub cash: f64,
    pub positions: BTreeMap<String, Position>,
    pub total_value: f64,
}

impl PortfolioSnapshot {
    pub fn quantity(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).map_or(0, |p| p.quantity)
    }

    pub fn holds(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub date: NaiveDate,
    pub cash: f64,
    pub total_value: f64,
    pub quantities: Vec<i64>,
}

/// Column-aligned view of a snapshot sequence: one row per date, one
/// quantity column per symbol ever held.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotTable {
    pub symbols: Vec<String>,
    pub rows: Vec<SnapshotRow>,
}

impl SnapshotTable {
    pub fn from_snapshots(snapshots: &[PortfolioSnapshot]) -> Self {
        let symbols: Vec<String> = snapshots
            .iter()
            .flat_map(|s| s.positions.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let rows = snapshots
            .iter()
            .map(|s| SnapshotRow {
                date: s.date,
                cash: s.cash,
                total_value: s.total_value,
                quantities: symbols.iter().map(|sym| s.quantity(sym)).collect(),
            })
            .collect();

        SnapshotTable { symbols, rows }
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = vec![
            "date".to_string(),
            "cash".to_string(),
            "total_value".to_string(),
        ];
        header.extend(self.symbols.iter().cloned());
        header
    }
}
