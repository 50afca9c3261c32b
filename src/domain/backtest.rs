//! Simulation loop: drives scheduler, risk overlay, information window and
//! ledger across the trading dates of a run.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::chain::{Block, ResultLedger};
use super::error::ChaintraderError;
use super::information::{InformationWindow, TargetWeights};
use super::instrument::AssetClass;
use super::ledger::{PositionLedger, TransactionRecord};
use super::metrics::Metrics;
use super::portfolio::{PortfolioSnapshot, SnapshotTable};
use super::position::ClosedTrade;
use super::risk::{DEFAULT_STOP_LOSS_THRESHOLD, StopLoss};
use super::scheduler::{Cadence, RebalanceScheduler};
use super::universe::{MissingDataPolicy, SkippedSymbol, Universe, load_universe};
use crate::ports::optimizer_port::OptimizerPort;
use crate::ports::price_port::PricePort;

/// When the stop-loss overlay is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCheck {
    #[default]
    Daily,
    Rebalance,
}

impl fmt::Display for RiskCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskCheck::Daily => write!(f, "daily"),
            RiskCheck::Rebalance => write!(f, "rebalance"),
        }
    }
}

impl FromStr for RiskCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(RiskCheck::Daily),
            "rebalance" => Ok(RiskCheck::Rebalance),
            other => Err(format!("unknown risk check '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_cash: f64,
    pub asset_class: AssetClass,
    /// Observations per instrument in the information window.
    pub lookback: usize,
    /// Calendar days of history fetched before `start_date`.
    pub warmup_days: i64,
    pub cadence: Cadence,
    pub stop_loss_threshold: f64,
    pub risk_check: RiskCheck,
    pub on_missing_data: MissingDataPolicy,
    pub risk_free_rate: f64,
}

impl BacktestConfig {
    pub const DEFAULT_LOOKBACK: usize = 20;
    pub const DEFAULT_WARMUP_DAYS: i64 = 365;

    pub fn new(start_date: NaiveDate, end_date: NaiveDate, initial_cash: f64) -> Self {
        BacktestConfig {
            start_date,
            end_date,
            initial_cash,
            asset_class: AssetClass::Equity,
            lookback: Self::DEFAULT_LOOKBACK,
            warmup_days: Self::DEFAULT_WARMUP_DAYS,
            cadence: Cadence::default(),
            stop_loss_threshold: DEFAULT_STOP_LOSS_THRESHOLD,
            risk_check: RiskCheck::default(),
            on_missing_data: MissingDataPolicy::default(),
            risk_free_rate: 0.0,
        }
    }

    pub fn fetch_start(&self) -> NaiveDate {
        self.start_date - Duration::days(self.warmup_days.max(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacktestState {
    Initialized,
    Running,
    Completed,
}

impl BacktestState {
    pub fn name(self) -> &'static str {
        match self {
            BacktestState::Initialized => "initialized",
            BacktestState::Running => "running",
            BacktestState::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub initial_cash: f64,
    pub snapshots: Vec<PortfolioSnapshot>,
    pub closed_trades: Vec<ClosedTrade>,
    pub transactions: Vec<TransactionRecord>,
    pub rebalances: Vec<TargetWeights>,
}

impl BacktestResult {
    pub fn to_table(&self) -> SnapshotTable {
        SnapshotTable::from_snapshots(&self.snapshots)
    }

    pub fn metrics(&self, risk_free_rate: f64) -> Metrics {
        Metrics::compute(
            &self.snapshots,
            &self.closed_trades,
            self.initial_cash,
            risk_free_rate,
        )
    }

    pub fn final_value(&self) -> f64 {
        self.snapshots
            .last()
            .map_or(self.initial_cash, |s| s.total_value)
    }
}

pub struct Backtest {
    config: BacktestConfig,
    state: BacktestState,
    window: InformationWindow,
    timeline: Vec<NaiveDate>,
    skipped: Vec<SkippedSymbol>,
    ledger: PositionLedger,
    scheduler: RebalanceScheduler,
    stop_loss: StopLoss,
    optimizer: Box<dyn OptimizerPort>,
}

impl Backtest {
    /// Load the universe and prepare a run.
    ///
    /// Fails with `EmptyUniverse` when no instrument has a full lookback of
    /// history on the first simulated date.
    pub fn new(
        config: BacktestConfig,
        universe: &Universe,
        price_port: &dyn PricePort,
        optimizer: Box<dyn OptimizerPort>,
    ) -> Result<Self, ChaintraderError> {
        let loaded = load_universe(
            price_port,
            universe,
            config.fetch_start(),
            config.end_date,
            config.on_missing_data,
        )?;
        let skipped = loaded.skipped.clone();
        let timeline = loaded.timeline(config.start_date, config.end_date);
        let window = InformationWindow::new(loaded, config.lookback);

        let first = timeline.first().copied().unwrap_or(config.start_date);
        if timeline.is_empty() || window.ready_count(first) == 0 {
            return Err(ChaintraderError::EmptyUniverse {
                date: first,
                lookback: config.lookback,
            });
        }

        tracing::info!(
            instruments = window.series().len(),
            dates = timeline.len(),
            start = %config.start_date,
            end = %config.end_date,
            optimizer = optimizer.name(),
            "backtest initialized"
        );

        let asset_class = universe.asset_class;
        Ok(Backtest {
            ledger: PositionLedger::new(config.initial_cash, asset_class),
            scheduler: RebalanceScheduler::new(config.cadence, asset_class.has_expiry()),
            stop_loss: StopLoss::new(config.stop_loss_threshold),
            config,
            state: BacktestState::Initialized,
            window,
            timeline,
            skipped,
            optimizer,
        })
    }

    pub fn state(&self) -> BacktestState {
        self.state
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn timeline(&self) -> &[NaiveDate] {
        &self.timeline
    }

    pub fn skipped(&self) -> &[SkippedSymbol] {
        &self.skipped
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    /// Simulate every trading date once. A backtest runs exactly one time.
    pub fn run(&mut self) -> Result<BacktestResult, ChaintraderError> {
        if self.state != BacktestState::Initialized {
            return Err(ChaintraderError::InvalidState {
                expected: BacktestState::Initialized.name(),
                actual: self.state.name(),
            });
        }
        self.state = BacktestState::Running;

        let mut snapshots = Vec::with_capacity(self.timeline.len());
        let mut rebalances = Vec::new();

        for &date in &self.timeline {
            let quotes = self.window.quotes_at(date);
            let rebalance = self
                .scheduler
                .should_rebalance(date, self.ledger.positions().values());

            if rebalance && self.ledger.asset_class().has_expiry() {
                self.ledger.close_expired(date, &quotes)?;
            }

            if rebalance || self.config.risk_check == RiskCheck::Daily {
                self.stop_loss.apply(&mut self.ledger, &quotes, date)?;
            }

            if rebalance {
                let targets = self.window.compute_weights(date, self.optimizer.as_ref());
                let fills = self.ledger.rebalance_to(&targets.weights, &quotes, date)?;
                tracing::debug!(
                    %date,
                    instruments = targets.weights.len(),
                    fills,
                    fallback = targets.fallback,
                    "rebalanced"
                );
                rebalances.push(targets);
            }

            snapshots.push(self.ledger.mark_to_market(&quotes, date)?);
        }

        self.state = BacktestState::Completed;

        let result = BacktestResult {
            initial_cash: self.config.initial_cash,
            snapshots,
            closed_trades: self.ledger.closed_trades().to_vec(),
            transactions: self.ledger.transactions().to_vec(),
            rebalances,
        };
        tracing::info!(
            dates = result.snapshots.len(),
            rebalances = result.rebalances.len(),
            trades = result.closed_trades.len(),
            open_positions = self.ledger.position_count(),
            final_value = result.final_value(),
            "backtest completed"
        );
        Ok(result)
    }

    /// Run, then record the snapshots as a new block. Nothing is written when
    /// the run fails.
    pub fn run_and_record(
        &mut self,
        ledger: &mut ResultLedger,
        name: &str,
    ) -> Result<(BacktestResult, Block), ChaintraderError> {
        let result = self.run()?;
        let block = ledger.append(name, &result.snapshots)?;
        Ok((result, block))
    }
}
