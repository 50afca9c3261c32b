//! Report generation port trait.

use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::ChaintraderError;
use crate::domain::ledger::TransactionRecord;

/// Port for writing a completed run to disk.
pub trait ReportPort {
    /// Per-date portfolio table.
    fn write(&self, result: &BacktestResult, output_path: &Path) -> Result<(), ChaintraderError>;

    /// Every fill of the run, in execution order.
    fn write_transactions(
        &self,
        transactions: &[TransactionRecord],
        output_path: &Path,
    ) -> Result<(), ChaintraderError>;
}
