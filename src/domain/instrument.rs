//! Tradable instruments and their asset-class tag.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    CommodityFuture,
}

impl AssetClass {
    /// Futures must be closed out before they expire; equities are carried
    /// indefinitely.
    pub fn has_expiry(self) -> bool {
        matches!(self, AssetClass::CommodityFuture)
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetClass::Equity => write!(f, "equity"),
            AssetClass::CommodityFuture => write!(f, "commodity_future"),
        }
    }
}

impl FromStr for AssetClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equity" | "stocks" => Ok(AssetClass::Equity),
            "commodity_future" | "commodity" | "commodities" => Ok(AssetClass::CommodityFuture),
            other => Err(format!("unknown asset class '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub expiry_date: Option<NaiveDate>,
}

impl Instrument {
    pub fn equity(symbol: impl Into<String>) -> Self {
        Instrument {
            symbol: symbol.into(),
            asset_class: AssetClass::Equity,
            expiry_date: None,
        }
    }

    pub fn commodity_future(symbol: impl Into<String>, expiry_date: Option<NaiveDate>) -> Self {
        Instrument {
            symbol: symbol.into(),
            asset_class: AssetClass::CommodityFuture,
            expiry_date,
        }
    }

    /// Build an instrument of the given class. The expiry is dropped for
    /// equities so the class invariant always holds.
    pub fn new(
        symbol: impl Into<String>,
        asset_class: AssetClass,
        expiry_date: Option<NaiveDate>,
    ) -> Self {
        match asset_class {
            AssetClass::Equity => Instrument::equity(symbol),
            AssetClass::CommodityFuture => Instrument::commodity_future(symbol, expiry_date),
        }
    }

    /// Same instrument seen through a dated row that may name a different
    /// front-month expiry.
    pub fn with_expiry(&self, expiry_date: Option<NaiveDate>) -> Self {
        Instrument::new(
            self.symbol.clone(),
            self.asset_class,
            expiry_date.or(self.expiry_date),
        )
    }

    pub fn is_expired(&self, date: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry <= date)
    }
}
