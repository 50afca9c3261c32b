//! Rolling information window: what the strategy may know on a given date,
//! and the target weights derived from it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::instrument::{AssetClass, Instrument};
use super::portfolio::{Quote, QuoteMap};
use super::price_series::{PricePoint, PriceSeries, simple_returns};
use super::universe::LoadedUniverse;
use crate::ports::optimizer_port::OptimizerPort;

/// Fewer observations than this carry no return information.
pub const MIN_WINDOW_OBSERVATIONS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ExclusionReason {
    InsufficientHistory { observations: usize },
    Expired { expiry_date: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub symbol: String,
    pub reason: ExclusionReason,
}

/// Weights for one rebalance date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetWeights {
    pub as_of: NaiveDate,
    pub weights: BTreeMap<String, f64>,
    pub excluded: Vec<Exclusion>,
    /// True when the optimizer result was replaced by equal weights.
    pub fallback: bool,
}

impl TargetWeights {
    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Sample covariance matrix of equally long return columns.
pub fn covariance_matrix(columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = columns.len();
    let len = columns.first().map_or(0, Vec::len);
    if len < 2 {
        return vec![vec![0.0; n]; n];
    }
    let means: Vec<f64> = columns
        .iter()
        .map(|c| c.iter().sum::<f64>() / len as f64)
        .collect();

    let mut cov = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let sum: f64 = columns[i]
                .iter()
                .zip(&columns[j])
                .map(|(a, b)| (a - means[i]) * (b - means[j]))
                .sum();
            let value = sum / (len - 1) as f64;
            cov[i][j] = value;
            cov[j][i] = value;
        }
    }
    cov
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn equal_weights(symbols: &[&str]) -> BTreeMap<String, f64> {
    let w = 1.0 / symbols.len() as f64;
    symbols.iter().map(|s| (s.to_string(), w)).collect()
}

/// Clamp to non-negative and renormalize. `None` when nothing usable is left.
fn normalize(raw: &[f64]) -> Option<Vec<f64>> {
    if raw.iter().any(|w| !w.is_finite()) {
        return None;
    }
    let clamped: Vec<f64> = raw.iter().map(|w| w.max(0.0)).collect();
    let total: f64 = clamped.iter().sum();
    if total <= 0.0 {
        return None;
    }
    Some(clamped.into_iter().map(|w| w / total).collect())
}

pub struct InformationWindow {
    asset_class: AssetClass,
    series: BTreeMap<String, PriceSeries>,
    lookback: usize,
}

impl InformationWindow {
    pub fn new(universe: LoadedUniverse, lookback: usize) -> Self {
        InformationWindow {
            asset_class: universe.asset_class,
            series: universe.series,
            lookback,
        }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn series(&self) -> &BTreeMap<String, PriceSeries> {
        &self.series
    }

    /// Number of instruments with a full lookback of history on `date`.
    pub fn ready_count(&self, date: NaiveDate) -> usize {
        self.series
            .values()
            .filter(|s| s.window(date, self.lookback).len() >= self.lookback)
            .count()
    }

    /// Latest quote at or before `date` for every symbol that has one. The
    /// quoted instrument carries the expiry of that row.
    pub fn quotes_at(&self, date: NaiveDate) -> QuoteMap {
        self.series
            .iter()
            .filter_map(|(symbol, series)| {
                let point = series.latest_at(date)?;
                Some((
                    symbol.clone(),
                    Quote {
                        instrument: Instrument::new(
                            symbol.clone(),
                            self.asset_class,
                            point.expiry_date,
                        ),
                        price: point.price,
                    },
                ))
            })
            .collect()
    }

    fn admissible(&self, as_of: NaiveDate) -> (Vec<(&str, &[PricePoint])>, Vec<Exclusion>) {
        let mut admitted = Vec::new();
        let mut excluded = Vec::new();

        for (symbol, series) in &self.series {
            let window = series.window(as_of, self.lookback);
            if window.len() < MIN_WINDOW_OBSERVATIONS {
                excluded.push(Exclusion {
                    symbol: symbol.clone(),
                    reason: ExclusionReason::InsufficientHistory {
                        observations: window.len(),
                    },
                });
                continue;
            }
            if self.asset_class.has_expiry() {
                if let Some(expiry_date) = window.last().and_then(|p| p.expiry_date) {
                    if expiry_date <= as_of {
                        excluded.push(Exclusion {
                            symbol: symbol.clone(),
                            reason: ExclusionReason::Expired { expiry_date },
                        });
                        continue;
                    }
                }
            }
            admitted.push((symbol.as_str(), window));
        }

        (admitted, excluded)
    }

    /// Mean return per window, and covariance of returns over the dates
    /// every window shares. `None` covariance when the overlap is too short.
    fn information_set(windows: &[(&str, &[PricePoint])]) -> (Vec<f64>, Option<Vec<Vec<f64>>>) {
        let expected: Vec<f64> = windows
            .iter()
            .map(|(_, w)| {
                let prices: Vec<f64> = w.iter().map(|p| p.price).collect();
                mean(&simple_returns(&prices))
            })
            .collect();

        let mut common: Option<BTreeSet<NaiveDate>> = None;
        for (_, w) in windows {
            let dates: BTreeSet<NaiveDate> = w.iter().map(|p| p.date).collect();
            common = Some(match common {
                None => dates,
                Some(c) => c.intersection(&dates).copied().collect(),
            });
        }
        let common = common.unwrap_or_default();

        let columns: Vec<Vec<f64>> = windows
            .iter()
            .map(|(_, w)| {
                let prices: Vec<f64> = w
                    .iter()
                    .filter(|p| common.contains(&p.date))
                    .map(|p| p.price)
                    .collect();
                simple_returns(&prices)
            })
            .collect();

        let observations = columns.first().map_or(0, Vec::len);
        if observations < 2 {
            return (expected, None);
        }
        (expected, Some(covariance_matrix(&columns)))
    }

    /// Target weights for `as_of`.
    ///
    /// Never fails: an optimizer error or unusable output degrades to equal
    /// weights across the admissible instruments.
    pub fn compute_weights(&self, as_of: NaiveDate, optimizer: &dyn OptimizerPort) -> TargetWeights {
        let (windows, excluded) = self.admissible(as_of);

        for exclusion in &excluded {
            tracing::debug!(
                symbol = %exclusion.symbol,
                %as_of,
                reason = ?exclusion.reason,
                "instrument omitted from window"
            );
        }

        if windows.is_empty() {
            tracing::warn!(%as_of, "no admissible instruments; targeting all cash");
            return TargetWeights {
                as_of,
                weights: BTreeMap::new(),
                excluded,
                fallback: false,
            };
        }

        let symbols: Vec<&str> = windows.iter().map(|(s, _)| *s).collect();
        let (expected, covariance) = Self::information_set(&windows);

        let solved = match covariance {
            None => {
                tracing::warn!(%as_of, "too few common observations for covariance");
                None
            }
            Some(cov) => match optimizer.solve(&expected, &cov) {
                Ok(raw) if raw.len() == symbols.len() => normalize(&raw),
                Ok(raw) => {
                    tracing::warn!(
                        %as_of,
                        expected = symbols.len(),
                        got = raw.len(),
                        "optimizer returned wrong number of weights"
                    );
                    None
                }
                Err(e) => {
                    tracing::warn!(%as_of, optimizer = optimizer.name(), error = %e, "optimizer failed");
                    None
                }
            },
        };

        let (weights, fallback) = match solved {
            Some(w) => (
                symbols.iter().map(|s| s.to_string()).zip(w).collect(),
                false,
            ),
            None => {
                tracing::info!(%as_of, instruments = symbols.len(), "falling back to equal weights");
                (equal_weights(&symbols), true)
            }
        };

        TargetWeights {
            as_of,
            weights,
            excluded,
            fallback,
        }
    }
}
