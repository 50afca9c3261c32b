//! Stop-loss overlay applied to open positions before rebalancing.

use chrono::NaiveDate;

use super::error::ChaintraderError;
use super::ledger::PositionLedger;
use super::portfolio::QuoteMap;
use super::position::{ClosedTrade, Position, TradeReason};

pub const DEFAULT_STOP_LOSS_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopLoss {
    pub threshold: f64,
}

impl Default for StopLoss {
    fn default() -> Self {
        StopLoss {
            threshold: DEFAULT_STOP_LOSS_THRESHOLD,
        }
    }
}

impl StopLoss {
    pub fn new(threshold: f64) -> Self {
        StopLoss { threshold }
    }

    /// True once the loss since entry reaches the threshold.
    pub fn flag_for_exit(&self, position: &Position, current_price: f64) -> bool {
        position
            .return_since_entry(current_price)
            .is_some_and(|r| r <= -self.threshold)
    }

    /// Close every flagged position at today's quote.
    ///
    /// Two passes: flagged symbols are collected first, then exited, so the
    /// ledger is not mutated while its positions are being scanned. Positions
    /// without a quote are left alone.
    pub fn apply(
        &self,
        ledger: &mut PositionLedger,
        quotes: &QuoteMap,
        date: NaiveDate,
    ) -> Result<Vec<ClosedTrade>, ChaintraderError> {
        let flagged: Vec<(String, f64)> = ledger
            .positions()
            .values()
            .filter_map(|pos| {
                let price = quotes.get(&pos.symbol)?.price;
                self.flag_for_exit(pos, price)
                    .then(|| (pos.symbol.clone(), price))
            })
            .collect();

        let mut exits = Vec::with_capacity(flagged.len());
        for (symbol, price) in flagged {
            let trade = ledger.exit_position(&symbol, price, date, TradeReason::StopLoss)?;
            tracing::info!(
                symbol = %trade.symbol,
                %date,
                entry_price = trade.entry_price,
                exit_price = trade.exit_price,
                pnl = trade.pnl,
                "stop-loss exit"
            );
            exits.push(trade);
        }
        Ok(exits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::instrument::{AssetClass, Instrument};
    use crate::domain::portfolio::Quote;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn position(quantity: i64, entry_price: f64) -> Position {
        Position {
            symbol: "AAA".into(),
            asset_class: AssetClass::Equity,
            quantity,
            entry_price,
            entry_date: date(),
            expiry_date: None,
        }
    }

    fn quotes(prices: &[(&str, f64)]) -> QuoteMap {
        prices
            .iter()
            .map(|(sym, price)| {
                (
                    sym.to_string(),
                    Quote {
                        instrument: Instrument::equity(*sym),
                        price: *price,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn long_flags_at_threshold() {
        let stop = StopLoss::default();
        let pos = position(10, 100.0);
        assert!(!stop.flag_for_exit(&pos, 91.0));
        assert!(stop.flag_for_exit(&pos, 90.0));
        assert!(stop.flag_for_exit(&pos, 50.0));
        assert!(!stop.flag_for_exit(&pos, 150.0));
    }

    #[test]
    fn short_flags_on_rise() {
        let stop = StopLoss::default();
        let pos = position(-10, 100.0);
        assert!(!stop.flag_for_exit(&pos, 90.0));
        assert!(!stop.flag_for_exit(&pos, 109.0));
        assert!(stop.flag_for_exit(&pos, 111.0));
    }

    #[test]
    fn apply_exits_only_flagged() {
        let mut ledger = PositionLedger::new(10_000.0, AssetClass::Equity);
        ledger
            .open(&Instrument::equity("AAA"), 10, 100.0, date())
            .unwrap();
        ledger
            .open(&Instrument::equity("BBB"), 10, 100.0, date())
            .unwrap();

        let exits = StopLoss::new(0.10)
            .apply(&mut ledger, &quotes(&[("AAA", 85.0), ("BBB", 95.0)]), date())
            .unwrap();

        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].symbol, "AAA");
        assert_eq!(exits[0].reason, TradeReason::StopLoss);
        assert!((exits[0].exit_price - 85.0).abs() < f64::EPSILON);
        assert!(!ledger.has_position("AAA"));
        assert!(ledger.has_position("BBB"));
        assert!((ledger.cash() - (8_000.0 + 850.0)).abs() < 1e-9);
    }

    #[test]
    fn apply_skips_unquoted_positions() {
        let mut ledger = PositionLedger::new(10_000.0, AssetClass::Equity);
        ledger
            .open(&Instrument::equity("AAA"), 10, 100.0, date())
            .unwrap();
        let exits = StopLoss::default()
            .apply(&mut ledger, &QuoteMap::new(), date())
            .unwrap();
        assert!(exits.is_empty());
        assert!(ledger.has_position("AAA"));
    }
}
