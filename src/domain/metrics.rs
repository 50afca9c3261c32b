//! Performance summary of a completed run.

use serde::{Deserialize, Serialize};

use super::portfolio::PortfolioSnapshot;
use super::position::ClosedTrade;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub initial_value: f64,
    pub final_value: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of consecutive snapshots below a prior peak.
    pub max_drawdown_duration: usize,
    pub trades: TradeStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub won: usize,
    pub lost: usize,
    pub breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    /// Mean calendar days between entry and exit.
    pub avg_holding_days: f64,
}

impl TradeStats {
    pub fn total(&self) -> usize {
        self.won + self.lost + self.breakeven
    }

    pub fn from_trades(trades: &[ClosedTrade]) -> Self {
        let mut stats = TradeStats::default();
        let mut gross_win = 0.0_f64;
        let mut gross_loss = 0.0_f64;
        let mut holding_days = 0i64;

        for trade in trades {
            if trade.pnl > 0.0 {
                stats.won += 1;
                gross_win += trade.pnl;
                stats.largest_win = stats.largest_win.max(trade.pnl);
            } else if trade.pnl < 0.0 {
                stats.lost += 1;
                gross_loss += -trade.pnl;
                stats.largest_loss = stats.largest_loss.max(-trade.pnl);
            } else {
                stats.breakeven += 1;
            }
            holding_days += (trade.exit_date - trade.entry_date).num_days();
        }

        let ratio = |num: f64, den: usize| if den > 0 { num / den as f64 } else { 0.0 };

        let total = stats.total();
        stats.win_rate = ratio(stats.won as f64, total);
        stats.avg_win = ratio(gross_win, stats.won);
        stats.avg_loss = ratio(gross_loss, stats.lost);
        stats.avg_holding_days = ratio(holding_days as f64, total);
        stats.profit_factor = if gross_loss > 0.0 {
            gross_win / gross_loss
        } else if gross_win > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };
        stats
    }
}

impl Metrics {
    pub fn compute(
        snapshots: &[PortfolioSnapshot],
        trades: &[ClosedTrade],
        initial_value: f64,
        risk_free_rate: f64,
    ) -> Self {
        let values: Vec<f64> = snapshots.iter().map(|s| s.total_value).collect();
        let final_value = values.last().copied().unwrap_or(initial_value);

        let total_return = if initial_value > 0.0 {
            final_value / initial_value - 1.0
        } else {
            0.0
        };

        let years = values.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = drawdown(&values);
        let (sharpe_ratio, sortino_ratio) =
            risk_adjusted(&values, risk_free_rate / TRADING_DAYS_PER_YEAR);

        Metrics {
            initial_value,
            final_value,
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            trades: TradeStats::from_trades(trades),
        }
    }
}

fn drawdown(values: &[f64]) -> (f64, usize) {
    let Some(&first) = values.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut run = 0usize;
    let mut longest = 0usize;

    for &value in values {
        if value >= peak {
            peak = value;
            run = 0;
            continue;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
        run += 1;
        longest = longest.max(run);
    }

    (max_dd, longest)
}

/// Annualized Sharpe and Sortino ratios of per-snapshot returns.
fn risk_adjusted(values: &[f64], period_rf: f64) -> (f64, f64) {
    let returns: Vec<f64> = values
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect();
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let excess = mean - period_rf;
    let annualize = TRADING_DAYS_PER_YEAR.sqrt();

    let stddev = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    let downside = (returns
        .iter()
        .filter(|r| **r < period_rf)
        .map(|r| (r - period_rf).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();

    let scaled = |dev: f64| if dev > 0.0 { excess / dev * annualize } else { 0.0 };
    (scaled(stddev), scaled(downside))
}
