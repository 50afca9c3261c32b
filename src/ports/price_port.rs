//! Price data access port trait.

use crate::domain::error::ChaintraderError;
use crate::domain::price_series::PriceSeries;
use chrono::NaiveDate;

pub trait PricePort {
    /// Observations for `symbol` dated within `[start_date, end_date]`.
    ///
    /// Unknown symbols fail with `DataUnavailable`.
    fn fetch(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<PriceSeries, ChaintraderError>;

    fn list_symbols(&self) -> Result<Vec<String>, ChaintraderError>;
}
