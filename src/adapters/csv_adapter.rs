//! CSV file price adapter.
//!
//! One file per symbol, `<dir>/<SYMBOL>.csv`, with a `date,close` header and
//! an optional third `expiry` column for futures rows.

use crate::domain::error::ChaintraderError;
use crate::domain::price_series::{PricePoint, PriceSeries};
use crate::ports::price_port::PricePort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct CsvPriceAdapter {
    base_path: PathBuf,
}

impl CsvPriceAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }
}

fn parse_date(symbol: &str, field: &str, value: &str) -> Result<NaiveDate, ChaintraderError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|e| {
        ChaintraderError::InvalidSeries {
            symbol: symbol.to_string(),
            reason: format!("invalid {field} '{value}': {e}"),
        }
    })
}

impl PricePort for CsvPriceAdapter {
    fn fetch(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, ChaintraderError> {
        let path = self.csv_path(symbol);
        let content = fs::read_to_string(&path).map_err(|e| ChaintraderError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let invalid = |reason: String| ChaintraderError::InvalidSeries {
            symbol: symbol.to_string(),
            reason,
        };

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| invalid(format!("CSV header error: {e}")))?
            .clone();
        let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        let date_col = column("date").ok_or_else(|| invalid("missing date column".into()))?;
        let close_col = column("close").ok_or_else(|| invalid("missing close column".into()))?;
        let expiry_col = column("expiry");

        let mut points = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| invalid(format!("CSV parse error: {e}")))?;

            let date_str = record
                .get(date_col)
                .ok_or_else(|| invalid("missing date value".into()))?;
            let date = parse_date(symbol, "date", date_str)?;
            if date < start_date || date > end_date {
                continue;
            }

            let close: f64 = record
                .get(close_col)
                .ok_or_else(|| invalid(format!("missing close value on {date}")))?
                .parse()
                .map_err(|e| invalid(format!("invalid close value on {date}: {e}")))?;

            let expiry = match expiry_col.and_then(|i| record.get(i)) {
                Some(raw) if !raw.is_empty() => Some(parse_date(symbol, "expiry", raw)?),
                _ => None,
            };

            points.push(match expiry {
                Some(expiry) => PricePoint::with_expiry(date, close, expiry),
                None => PricePoint::new(date, close),
            });
        }

        points.sort_by_key(|p| p.date);
        tracing::debug!(%symbol, rows = points.len(), path = %path.display(), "read price file");
        PriceSeries::new(symbol, points)
    }

    fn list_symbols(&self) -> Result<Vec<String>, ChaintraderError> {
        let entries = fs::read_dir(&self.base_path)?;

        let mut symbols = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            if let Some(symbol) = name.to_string_lossy().strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
