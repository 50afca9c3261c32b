//! Dated price observations and the unified trading timeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::error::ChaintraderError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
    pub expiry_date: Option<NaiveDate>,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        PricePoint {
            date,
            price,
            expiry_date: None,
        }
    }

    pub fn with_expiry(date: NaiveDate, price: f64, expiry_date: NaiveDate) -> Self {
        PricePoint {
            date,
            price,
            expiry_date: Some(expiry_date),
        }
    }
}

/// Price history of one symbol, strictly increasing by date.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    symbol: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, points: Vec<PricePoint>) -> Result<Self, ChaintraderError> {
        let symbol = symbol.into();

        for point in &points {
            if !point.price.is_finite() || point.price <= 0.0 {
                return Err(ChaintraderError::InvalidSeries {
                    symbol,
                    reason: format!("non-positive price {} on {}", point.price, point.date),
                });
            }
        }

        if let Some(pair) = points.windows(2).find(|w| w[1].date <= w[0].date) {
            return Err(ChaintraderError::InvalidSeries {
                symbol,
                reason: format!(
                    "dates not strictly increasing: {} followed by {}",
                    pair[0].date, pair[1].date
                ),
            });
        }

        Ok(PriceSeries { symbol, points })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn has_expiry_annotations(&self) -> bool {
        self.points.iter().any(|p| p.expiry_date.is_some())
    }

    /// Number of observations dated on or before `date`.
    fn count_through(&self, date: NaiveDate) -> usize {
        self.points.partition_point(|p| p.date <= date)
    }

    /// The latest observation dated on or before `date`.
    pub fn latest_at(&self, date: NaiveDate) -> Option<&PricePoint> {
        let end = self.count_through(date);
        end.checked_sub(1).map(|i| &self.points[i])
    }

    /// The observation dated exactly `date`.
    pub fn get(&self, date: NaiveDate) -> Option<&PricePoint> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| &self.points[i])
    }

    /// Trailing window: the last `lookback` observations dated on or before
    /// `as_of`. Shorter when history is thin.
    pub fn window(&self, as_of: NaiveDate, lookback: usize) -> &[PricePoint] {
        let end = self.count_through(as_of);
        let start = end.saturating_sub(lookback);
        &self.points[start..end]
    }

    /// Fill rows that carry no expiry using `resolve`.
    pub fn annotate_expiry<F>(self, mut resolve: F) -> Result<Self, ChaintraderError>
    where
        F: FnMut(NaiveDate) -> Result<NaiveDate, ChaintraderError>,
    {
        let mut points = self.points;
        for point in points.iter_mut().filter(|p| p.expiry_date.is_none()) {
            point.expiry_date = Some(resolve(point.date)?);
        }
        Ok(PriceSeries {
            symbol: self.symbol,
            points,
        })
    }
}

/// Sorted union of every observation date across `series`.
pub fn build_unified_timeline<'a>(series: impl IntoIterator<Item = &'a PriceSeries>) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = series
        .into_iter()
        .flat_map(|s| s.points.iter().map(|p| p.date))
        .collect();
    unique_dates.into_iter().collect()
}

/// Simple returns between consecutive prices.
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(date: &str) -> NaiveDate {
        NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap()
    }

    fn series(symbol: &str, rows: &[(&str, f64)]) -> PriceSeries {
        PriceSeries::new(
            symbol,
            rows.iter().map(|(date, px)| PricePoint::new(d(date), *px)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_duplicate_dates() {
        let result = PriceSeries::new(
            "AAA",
            vec![
                PricePoint::new(d("2024-01-01"), 10.0),
                PricePoint::new(d("2024-01-01"), 11.0),
            ],
        );
        assert!(matches!(result, Err(ChaintraderError::InvalidSeries { .. })));
    }

    #[test]
    fn rejects_unordered_dates() {
        let result = PriceSeries::new(
            "AAA",
            vec![
                PricePoint::new(d("2024-01-03"), 10.0),
                PricePoint::new(d("2024-01-02"), 11.0),
            ],
        );
        assert!(matches!(result, Err(ChaintraderError::InvalidSeries { .. })));
    }

    #[test]
    fn rejects_non_positive_price() {
        let result = PriceSeries::new("AAA", vec![PricePoint::new(d("2024-01-03"), 0.0)]);
        assert!(matches!(result, Err(ChaintraderError::InvalidSeries { .. })));
    }

    #[test]
    fn latest_at_steps_back_over_gaps() {
        let s = series("AAA", &[("2024-01-01", 10.0), ("2024-01-03", 12.0)]);
        assert_eq!(s.latest_at(d("2024-01-02")).unwrap().price, 10.0);
        assert_eq!(s.latest_at(d("2024-01-03")).unwrap().price, 12.0);
        assert_eq!(s.latest_at(d("2024-01-09")).unwrap().price, 12.0);
        assert!(s.latest_at(d("2023-12-31")).is_none());
        assert!(s.get(d("2024-01-02")).is_none());
    }

    #[test]
    fn window_includes_as_of_and_truncates() {
        let s = series(
            "AAA",
            &[
                ("2024-01-01", 10.0),
                ("2024-01-02", 11.0),
                ("2024-01-03", 12.0),
                ("2024-01-04", 13.0),
            ],
        );
        let w = s.window(d("2024-01-03"), 2);
        assert_eq!(w.len(), 2);
        assert_eq!(w[0].date, d("2024-01-02"));
        assert_eq!(w[1].date, d("2024-01-03"));

        assert_eq!(s.window(d("2024-01-02"), 10).len(), 2);
        assert!(s.window(d("2023-01-01"), 10).is_empty());
    }

    #[test]
    fn annotate_expiry_only_fills_missing_rows() {
        let s = PriceSeries::new(
            "CL=F",
            vec![
                PricePoint::new(d("2024-01-02"), 70.0),
                PricePoint::with_expiry(d("2024-01-03"), 71.0, d("2024-02-20")),
            ],
        )
        .unwrap();
        let s = s.annotate_expiry(|_| Ok(d("2024-01-19"))).unwrap();
        assert_eq!(s.points()[0].expiry_date, Some(d("2024-01-19")));
        assert_eq!(s.points()[1].expiry_date, Some(d("2024-02-20")));
    }

    #[test]
    fn unified_timeline_merges_and_sorts() {
        let a = series("AAA", &[("2024-01-02", 1.0), ("2024-01-05", 1.0)]);
        let b = series("BBB", &[("2024-01-01", 1.0), ("2024-01-02", 1.0)]);
        let timeline = build_unified_timeline([&a, &b]);
        assert_eq!(
            timeline,
            vec![d("2024-01-01"), d("2024-01-02"), d("2024-01-05")]
        );
    }

    #[test]
    fn unified_timeline_empty() {
        let timeline = build_unified_timeline(std::iter::empty::<&PriceSeries>());
        assert!(timeline.is_empty());
    }

    #[test]
    fn simple_returns_basic() {
        let r = simple_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(r.len(), 2);
        assert!((r[0] - 0.10).abs() < 1e-12);
        assert!((r[1] - (-0.10)).abs() < 1e-12);
    }
}
