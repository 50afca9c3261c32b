//! Decides which simulated dates trigger a rebalance.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::position::Position;

/// How often the portfolio is rebalanced in the absence of expiries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    /// Every N simulated trading dates.
    TradingDays(u32),
    /// Once at least N calendar days have passed.
    CalendarDays(u32),
    /// First trading date of each month.
    Monthly,
}

impl Default for Cadence {
    fn default() -> Self {
        Cadence::TradingDays(5)
    }
}

impl Cadence {
    /// Build a cadence from its config name and period. `every` is ignored
    /// for `monthly`.
    pub fn from_parts(kind: &str, every: u32) -> Result<Self, String> {
        if every == 0 {
            return Err("cadence period must be at least 1".to_string());
        }
        match kind.trim().to_lowercase().as_str() {
            "trading_days" => Ok(Cadence::TradingDays(every)),
            "calendar_days" => Ok(Cadence::CalendarDays(every)),
            "monthly" => Ok(Cadence::Monthly),
            other => Err(format!("unknown cadence '{other}'")),
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::TradingDays(n) => write!(f, "every {n} trading days"),
            Cadence::CalendarDays(n) => write!(f, "every {n} calendar days"),
            Cadence::Monthly => write!(f, "monthly"),
        }
    }
}

/// Why a date was chosen for rebalancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceTrigger {
    Initial,
    Cadence,
    Expiry,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceScheduler {
    cadence: Cadence,
    expiry_aware: bool,
    last_rebalance: Option<NaiveDate>,
    dates_since_rebalance: u32,
}

impl RebalanceScheduler {
    pub fn new(cadence: Cadence, expiry_aware: bool) -> Self {
        RebalanceScheduler {
            cadence,
            expiry_aware,
            last_rebalance: None,
            dates_since_rebalance: 0,
        }
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    pub fn last_rebalance(&self) -> Option<NaiveDate> {
        self.last_rebalance
    }

    /// Call once per simulated date, in order.
    pub fn should_rebalance<'a>(
        &mut self,
        today: NaiveDate,
        open_positions: impl IntoIterator<Item = &'a Position>,
    ) -> bool {
        self.trigger(today, open_positions).is_some()
    }

    /// Like [`should_rebalance`](Self::should_rebalance), reporting the reason.
    /// A `Some` answer records `today` as the last rebalance.
    pub fn trigger<'a>(
        &mut self,
        today: NaiveDate,
        open_positions: impl IntoIterator<Item = &'a Position>,
    ) -> Option<RebalanceTrigger> {
        self.dates_since_rebalance = self.dates_since_rebalance.saturating_add(1);

        let trigger = match self.last_rebalance {
            None => Some(RebalanceTrigger::Initial),
            Some(last) => {
                if self.cadence_elapsed(last, today) {
                    Some(RebalanceTrigger::Cadence)
                } else if self.expiry_aware
                    && open_positions.into_iter().any(|p| p.is_expired(today))
                {
                    Some(RebalanceTrigger::Expiry)
                } else {
                    None
                }
            }
        };

        if trigger.is_some() {
            self.last_rebalance = Some(today);
            self.dates_since_rebalance = 0;
        }
        trigger
    }

    fn cadence_elapsed(&self, last: NaiveDate, today: NaiveDate) -> bool {
        match self.cadence {
            Cadence::TradingDays(n) => self.dates_since_rebalance >= n.max(1),
            Cadence::CalendarDays(n) => (today - last).num_days() >= i64::from(n.max(1)),
            Cadence::Monthly => (today.year(), today.month()) != (last.year(), last.month()),
        }
    }
}
