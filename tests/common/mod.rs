#![allow(dead_code)]

use chaintrader::domain::backtest::BacktestConfig;
use chaintrader::domain::error::ChaintraderError;
use chaintrader::domain::price_series::{PricePoint, PriceSeries};
use chaintrader::ports::price_port::PricePort;
use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;

/// In-memory price port. Unknown symbols fail with `DataUnavailable`;
/// symbols registered with an error fail with that reason instead.
pub struct MockPricePort {
    pub data: HashMap<String, Vec<PricePoint>>,
    pub errors: HashMap<String, String>,
}

impl MockPricePort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_series(mut self, symbol: &str, points: Vec<PricePoint>) -> Self {
        self.data.insert(symbol.to_string(), points);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl PricePort for MockPricePort {
    fn fetch(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, ChaintraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(ChaintraderError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        let points = self
            .data
            .get(symbol)
            .ok_or_else(|| ChaintraderError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "unknown symbol".to_string(),
            })?
            .iter()
            .filter(|p| p.date >= start_date && p.date <= end_date)
            .cloned()
            .collect();
        PriceSeries::new(symbol, points)
    }

    fn list_symbols(&self) -> Result<Vec<String>, ChaintraderError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `count` consecutive weekdays starting at `start` (or the next weekday).
pub fn weekdays(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    start
        .iter_days()
        .filter(|d| d.weekday().number_from_monday() <= 5)
        .take(count)
        .collect()
}

pub fn flat_series(dates: &[NaiveDate], price: f64) -> Vec<PricePoint> {
    dates.iter().map(|d| PricePoint::new(*d, price)).collect()
}

pub fn priced_series(dates: &[NaiveDate], prices: &[f64]) -> Vec<PricePoint> {
    dates
        .iter()
        .zip(prices)
        .map(|(d, p)| PricePoint::new(*d, *p))
        .collect()
}

/// Config over `dates[start_index..]` with the earlier dates as warmup.
pub fn config_over(dates: &[NaiveDate], start_index: usize, initial_cash: f64) -> BacktestConfig {
    BacktestConfig {
        lookback: 3,
        warmup_days: 30,
        ..BacktestConfig::new(
            dates[start_index],
            *dates.last().unwrap(),
            initial_cash,
        )
    }
}
