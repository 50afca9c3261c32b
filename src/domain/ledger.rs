//! Position ledger: cash, open positions and order execution.
//!
//! All fills happen at the supplied price with no costs. Quantities are whole
//! units and the ledger never lets cash go negative.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::error::ChaintraderError;
use super::instrument::{AssetClass, Instrument};
use super::portfolio::{PortfolioSnapshot, QuoteMap};
use super::position::{ClosedTrade, Position, TradeReason};

/// Slack used when converting dollar deltas to whole units.
const QUANTITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// One executed fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub date: NaiveDate,
    pub side: Side,
    pub symbol: String,
    pub quantity: i64,
    pub price: f64,
    pub cash_after: f64,
    pub reason: TradeReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionLedger {
    asset_class: AssetClass,
    initial_cash: f64,
    cash: f64,
    positions: BTreeMap<String, Position>,
    closed_trades: Vec<ClosedTrade>,
    transactions: Vec<TransactionRecord>,
}

fn validate_price(symbol: &str, price: f64) -> Result<(), ChaintraderError> {
    if !price.is_finite() || price <= 0.0 {
        return Err(ChaintraderError::InvalidOrder {
            symbol: symbol.to_string(),
            reason: format!("price {price} must be positive"),
        });
    }
    Ok(())
}

fn validate_quantity(symbol: &str, quantity: i64) -> Result<(), ChaintraderError> {
    if quantity <= 0 {
        return Err(ChaintraderError::InvalidOrder {
            symbol: symbol.to_string(),
            reason: format!("quantity {quantity} must be positive"),
        });
    }
    Ok(())
}

impl PositionLedger {
    pub fn new(initial_cash: f64, asset_class: AssetClass) -> Self {
        PositionLedger {
            asset_class,
            initial_cash,
            cash: initial_cash,
            positions: BTreeMap::new(),
            closed_trades: Vec::new(),
            transactions: Vec::new(),
        }
    }

    pub fn asset_class(&self) -> AssetClass {
        self.asset_class
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    pub fn transactions(&self) -> &[TransactionRecord] {
        &self.transactions
    }

    fn record(
        &mut self,
        date: NaiveDate,
        side: Side,
        symbol: &str,
        quantity: i64,
        price: f64,
        reason: TradeReason,
    ) {
        self.transactions.push(TransactionRecord {
            date,
            side,
            symbol: symbol.to_string(),
            quantity,
            price,
            cash_after: self.cash,
            reason,
        });
    }

    /// Buy `quantity` units of `instrument`.
    ///
    /// Adding to an open position averages the entry price and keeps the
    /// earlier of the two expiries.
    pub fn open(
        &mut self,
        instrument: &Instrument,
        quantity: i64,
        price: f64,
        date: NaiveDate,
    ) -> Result<Position, ChaintraderError> {
        let symbol = instrument.symbol.as_str();
        validate_quantity(symbol, quantity)?;
        validate_price(symbol, price)?;

        let cost = quantity as f64 * price;
        if cost > self.cash {
            return Err(ChaintraderError::InsufficientCash {
                symbol: symbol.to_string(),
                date,
                quantity,
                price,
                required: cost,
                available: self.cash,
            });
        }

        self.cash -= cost;

        let position = match self.positions.get_mut(symbol) {
            Some(existing) => {
                let combined = existing.quantity + quantity;
                existing.entry_price = (existing.quantity as f64 * existing.entry_price + cost)
                    / combined as f64;
                existing.quantity = combined;
                existing.expiry_date = match (existing.expiry_date, instrument.expiry_date) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                existing.clone()
            }
            None => {
                let position = Position {
                    symbol: symbol.to_string(),
                    asset_class: instrument.asset_class,
                    quantity,
                    entry_price: price,
                    entry_date: date,
                    expiry_date: instrument.expiry_date,
                };
                self.positions.insert(symbol.to_string(), position.clone());
                position
            }
        };

        self.record(date, Side::Buy, symbol, quantity, price, TradeReason::Rebalance);
        Ok(position)
    }

    /// Fully liquidate `symbol` at `price`, returning the realized pnl.
    pub fn close(
        &mut self,
        symbol: &str,
        price: f64,
        date: NaiveDate,
    ) -> Result<f64, ChaintraderError> {
        self.exit_position(symbol, price, date, TradeReason::Rebalance)
            .map(|trade| trade.pnl)
    }

    /// Fully liquidate `symbol` and record why.
    pub fn exit_position(
        &mut self,
        symbol: &str,
        price: f64,
        date: NaiveDate,
        reason: TradeReason,
    ) -> Result<ClosedTrade, ChaintraderError> {
        validate_price(symbol, price)?;
        let position = self
            .positions
            .remove(symbol)
            .ok_or_else(|| ChaintraderError::NoPosition {
                symbol: symbol.to_string(),
                date,
                action: "close",
            })?;

        self.cash += position.market_value(price);

        let trade = ClosedTrade {
            symbol: position.symbol.clone(),
            quantity: position.quantity,
            entry_price: position.entry_price,
            exit_price: price,
            entry_date: position.entry_date,
            exit_date: date,
            pnl: position.unrealized_pnl(price),
            reason,
        };
        self.closed_trades.push(trade.clone());
        self.record(
            date,
            Side::Sell,
            symbol,
            position.quantity.abs(),
            price,
            reason,
        );
        Ok(trade)
    }

    /// Sell part of a long position. Reducing by the full quantity or more
    /// closes it.
    pub fn reduce(
        &mut self,
        symbol: &str,
        quantity: i64,
        price: f64,
        date: NaiveDate,
    ) -> Result<f64, ChaintraderError> {
        self.reduce_with_reason(symbol, quantity, price, date, TradeReason::Rebalance)
    }

    fn reduce_with_reason(
        &mut self,
        symbol: &str,
        quantity: i64,
        price: f64,
        date: NaiveDate,
        reason: TradeReason,
    ) -> Result<f64, ChaintraderError> {
        validate_quantity(symbol, quantity)?;
        validate_price(symbol, price)?;

        let position = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| ChaintraderError::NoPosition {
                symbol: symbol.to_string(),
                date,
                action: "reduce",
            })?;

        if quantity >= position.quantity {
            return self
                .exit_position(symbol, price, date, reason)
                .map(|trade| trade.pnl);
        }

        position.quantity -= quantity;
        let pnl = quantity as f64 * (price - position.entry_price);
        let trade = ClosedTrade {
            symbol: symbol.to_string(),
            quantity,
            entry_price: position.entry_price,
            exit_price: price,
            entry_date: position.entry_date,
            exit_date: date,
            pnl,
            reason,
        };

        self.cash += quantity as f64 * price;
        self.closed_trades.push(trade);
        self.record(date, Side::Sell, symbol, quantity, price, reason);
        Ok(pnl)
    }

    fn price_for(
        quotes: &QuoteMap,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<f64, ChaintraderError> {
        quotes
            .get(symbol)
            .map(|q| q.price)
            .ok_or_else(|| ChaintraderError::MissingPrice {
                symbol: symbol.to_string(),
                date,
            })
    }

    /// Close every position whose expiry is on or before `date`.
    pub fn close_expired(
        &mut self,
        date: NaiveDate,
        quotes: &QuoteMap,
    ) -> Result<Vec<ClosedTrade>, ChaintraderError> {
        let expired: Vec<String> = self
            .positions
            .values()
            .filter(|pos| pos.is_expired(date))
            .map(|pos| pos.symbol.clone())
            .collect();

        let mut closed = Vec::with_capacity(expired.len());
        for symbol in expired {
            let price = Self::price_for(quotes, &symbol, date)?;
            let trade = self.exit_position(&symbol, price, date, TradeReason::Expiry)?;
            tracing::info!(
                symbol = %trade.symbol,
                %date,
                price,
                pnl = trade.pnl,
                "closed expiring contract"
            );
            closed.push(trade);
        }
        Ok(closed)
    }

    /// Cash plus signed market value of every open position.
    pub fn total_value(&self, quotes: &QuoteMap, date: NaiveDate) -> Result<f64, ChaintraderError> {
        let mut total = self.cash;
        for position in self.positions.values() {
            total += position.market_value(Self::price_for(quotes, &position.symbol, date)?);
        }
        Ok(total)
    }

    /// Trade towards `targets` (symbol to fraction of total value).
    ///
    /// Symbols held but absent from `targets` are sold down to zero. Sells run
    /// before buys so their proceeds fund the purchases. A buy that would
    /// overdraw cash is cut to what cash allows. Returns the number of fills.
    pub fn rebalance_to(
        &mut self,
        targets: &BTreeMap<String, f64>,
        quotes: &QuoteMap,
        date: NaiveDate,
    ) -> Result<usize, ChaintraderError> {
        if let Some((symbol, weight)) = targets
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(ChaintraderError::InvalidOrder {
                symbol: symbol.clone(),
                reason: format!("target weight {weight} must be finite and non-negative"),
            });
        }

        let mut fills = 0;
        if self.asset_class.has_expiry() {
            fills += self.close_expired(date, quotes)?.len();
        }

        let total_value = self.total_value(quotes, date)?;
        let symbols: BTreeSet<String> = targets
            .keys()
            .chain(self.positions.keys())
            .cloned()
            .collect();

        let mut sells: Vec<(String, i64, f64)> = Vec::new();
        let mut buys: Vec<(Instrument, i64, f64)> = Vec::new();

        for symbol in symbols {
            let weight = targets.get(&symbol).copied().unwrap_or(0.0);
            let held = self.positions.get(&symbol).map_or(0, |p| p.quantity);
            if weight == 0.0 && held == 0 {
                continue;
            }

            let quote = quotes
                .get(&symbol)
                .ok_or_else(|| ChaintraderError::MissingPrice {
                    symbol: symbol.clone(),
                    date,
                })?;
            let price = quote.price;

            if weight == 0.0 {
                sells.push((symbol, held, price));
                continue;
            }

            let target_value = total_value * weight;
            let current_value = held as f64 * price;

            if current_value > target_value {
                let quantity = ((current_value - target_value) / price - QUANTITY_EPSILON).ceil() as i64;
                let quantity = quantity.min(held);
                if quantity > 0 {
                    sells.push((symbol, quantity, price));
                }
            } else if target_value > current_value {
                let quantity = ((target_value - current_value) / price + QUANTITY_EPSILON).floor() as i64;
                if quantity > 0 {
                    buys.push((quote.instrument.clone(), quantity, price));
                }
            }
        }

        for (symbol, quantity, price) in sells {
            self.reduce_with_reason(&symbol, quantity, price, date, TradeReason::Rebalance)?;
            fills += 1;
        }

        for (instrument, wanted, price) in buys {
            let mut affordable = (self.cash / price).floor() as i64;
            if affordable as f64 * price > self.cash {
                affordable -= 1;
            }
            let quantity = wanted.min(affordable);
            if quantity < wanted {
                tracing::warn!(
                    symbol = %instrument.symbol,
                    %date,
                    wanted,
                    filled = quantity,
                    cash = self.cash,
                    "buy capped by available cash"
                );
            }
            if quantity > 0 {
                self.open(&instrument, quantity, price, date)?;
                fills += 1;
            }
        }

        Ok(fills)
    }

    pub fn mark_to_market(
        &self,
        quotes: &QuoteMap,
        date: NaiveDate,
    ) -> Result<PortfolioSnapshot, ChaintraderError> {
        Ok(PortfolioSnapshot {
            date,
            cash: self.cash,
            positions: self.positions.clone(),
            total_value: self.total_value(quotes, date)?,
        })
    }
}
