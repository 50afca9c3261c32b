//! Open positions and realized trades.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::instrument::AssetClass;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub asset_class: AssetClass,
    pub quantity: i64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub expiry_date: Option<NaiveDate>,
}

impl Position {
    pub fn is_long(&self) -> bool {
        self.quantity > 0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0
    }

    /// Signed exposure at `price`.
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity as f64 * (price - self.entry_price)
    }

    /// Price move since entry, signed so that a loss is negative for both
    /// longs and shorts.
    pub fn return_since_entry(&self, price: f64) -> Option<f64> {
        if self.entry_price <= 0.0 {
            return None;
        }
        let raw = (price - self.entry_price) / self.entry_price;
        Some(if self.is_short() { -raw } else { raw })
    }

    pub fn is_expired(&self, date: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry <= date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeReason {
    Rebalance,
    StopLoss,
    Expiry,
}

impl fmt::Display for TradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeReason::Rebalance => write!(f, "rebalance"),
            TradeReason::StopLoss => write!(f, "stop_loss"),
            TradeReason::Expiry => write!(f, "expiry"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub quantity: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub pnl: f64,
    pub reason: TradeReason,
}
