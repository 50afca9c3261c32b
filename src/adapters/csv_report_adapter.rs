//! CSV reports: one row per simulated date with cash, total value and the
//! quantity held of every symbol that appears in the run, and the run's
//! transaction log.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::ChaintraderError;
use crate::domain::ledger::TransactionRecord;
use crate::ports::report_port::ReportPort;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReportAdapter;

const TRANSACTION_HEADER: [&str; 7] =
    ["date", "action", "symbol", "quantity", "price", "cash", "reason"];

fn csv_error(e: csv::Error) -> ChaintraderError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => ChaintraderError::Io(io),
        other => ChaintraderError::Io(std::io::Error::other(format!("{other:?}"))),
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, result: &BacktestResult, output_path: &Path) -> Result<(), ChaintraderError> {
        let table = result.to_table();
        let mut wtr = csv::Writer::from_path(output_path).map_err(csv_error)?;

        wtr.write_record(table.header()).map_err(csv_error)?;
        for row in &table.rows {
            let mut record = vec![
                row.date.format("%Y-%m-%d").to_string(),
                format!("{:.2}", row.cash),
                format!("{:.2}", row.total_value),
            ];
            record.extend(row.quantities.iter().map(i64::to_string));
            wtr.write_record(&record).map_err(csv_error)?;
        }
        wtr.flush()?;

        tracing::info!(path = %output_path.display(), rows = table.rows.len(), "wrote report");
        Ok(())
    }

    fn write_transactions(
        &self,
        transactions: &[TransactionRecord],
        output_path: &Path,
    ) -> Result<(), ChaintraderError> {
        let mut wtr = csv::Writer::from_path(output_path).map_err(csv_error)?;

        wtr.write_record(TRANSACTION_HEADER).map_err(csv_error)?;
        for tx in transactions {
            wtr.write_record([
                tx.date.format("%Y-%m-%d").to_string(),
                tx.side.to_string(),
                tx.symbol.clone(),
                tx.quantity.to_string(),
                format!("{:.4}", tx.price),
                format!("{:.2}", tx.cash_after),
                tx.reason.to_string(),
            ])
            .map_err(csv_error)?;
        }
        wtr.flush()?;

        tracing::info!(
            path = %output_path.display(),
            rows = transactions.len(),
            "wrote transaction log"
        );
        Ok(())
    }
}
