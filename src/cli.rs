//! CLI definition and dispatch.

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use crate::adapters::csv_adapter::CsvPriceAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_chain_adapter::JsonFileChainStore;
use crate::adapters::optimizer_adapter::{MeanVarianceOptimizer, build_optimizer};
use crate::domain::backtest::{Backtest, BacktestConfig, BacktestResult, RiskCheck};
use crate::domain::chain::{Chain, ResultLedger, generate_run_name};
use crate::domain::config_validation::{parse_date, validate_config};
use crate::domain::error::ChaintraderError;
use crate::domain::expiry::{FuturesContract, front_month_expiry};
use crate::domain::instrument::AssetClass;
use crate::domain::metrics::Metrics;
use crate::domain::scheduler::Cadence;
use crate::domain::universe::{MissingDataPolicy, Universe};
use crate::ports::chain_port::ChainStorePort;
use crate::ports::config_port::ConfigPort;
use crate::ports::optimizer_port::{OptimizerKind, OptimizerPort};
use crate::ports::price_port::PricePort;
use crate::ports::report_port::ReportPort;

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_CHAIN_PATH: &str = "chain.json";

#[derive(Parser, Debug)]
#[command(
    name = "chaintrader",
    about = "Rolling-window portfolio backtester with a tamper-evident result chain"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest and record it on the result chain
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Block name; a random one is generated when omitted
        #[arg(short, long)]
        name: Option<String>,
        /// Write the snapshot table as CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the transaction log as CSV
        #[arg(short, long)]
        transactions: Option<PathBuf>,
        /// Override `[chain] path`
        #[arg(long)]
        chain: Option<PathBuf>,
    },
    /// Check every hash and link of a result chain
    Verify {
        #[arg(long, default_value = DEFAULT_CHAIN_PATH)]
        chain: PathBuf,
    },
    /// Print the blocks of a result chain
    ShowChain {
        #[arg(long, default_value = DEFAULT_CHAIN_PATH)]
        chain: PathBuf,
    },
    /// Front-month expiry for a futures symbol
    Expiry {
        #[arg(long)]
        symbol: String,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Validate a configuration file without running it
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols available in the configured data directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            name,
            output,
            transactions,
            chain,
        } => run_backtest(
            &config,
            name.as_deref(),
            output.as_deref(),
            transactions.as_deref(),
            chain.as_deref(),
        ),
        Command::Verify { chain } => run_verify(&chain),
        Command::ShowChain { chain } => run_show_chain(&chain),
        Command::Expiry { symbol, date } => run_expiry(&symbol, date),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { config } => run_list_symbols(&config),
    }
}

fn fail(err: &ChaintraderError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

fn load_validated_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    eprintln!("Loading config from {}", path.display());
    let adapter = load_config(path)?;
    validate_config(&adapter).map_err(|e| fail(&e))?;
    Ok(adapter)
}

/// Parse an optional enum-valued setting, falling back to `default`.
fn parse_setting<T: FromStr<Err = String>>(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, ChaintraderError> {
    match adapter.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|reason| ChaintraderError::ConfigInvalid {
            section: section.into(),
            key: key.into(),
            reason,
        }),
    }
}

fn non_negative(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<u64, ChaintraderError> {
    u64::try_from(adapter.get_int(section, key, default)).map_err(|_| {
        ChaintraderError::ConfigInvalid {
            section: section.into(),
            key: key.into(),
            reason: format!("{key} must be non-negative"),
        }
    })
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, ChaintraderError> {
    let start_date = parse_date(
        adapter.get_string("backtest", "start_date").as_deref(),
        "start_date",
    )?;
    let end_date = parse_date(
        adapter.get_string("backtest", "end_date").as_deref(),
        "end_date",
    )?;

    let defaults = BacktestConfig::new(start_date, end_date, 100_000.0);

    let cadence_every = non_negative(adapter, "backtest", "cadence_every", 5)?;
    let cadence_kind = adapter
        .get_string("backtest", "cadence")
        .unwrap_or_else(|| "trading_days".to_string());
    let cadence = Cadence::from_parts(
        &cadence_kind,
        u32::try_from(cadence_every).unwrap_or(u32::MAX),
    )
    .map_err(|reason| ChaintraderError::ConfigInvalid {
        section: "backtest".into(),
        key: "cadence".into(),
        reason,
    })?;

    Ok(BacktestConfig {
        start_date,
        end_date,
        initial_cash: adapter.get_double("backtest", "initial_cash", defaults.initial_cash),
        asset_class: parse_setting(adapter, "backtest", "asset_class", AssetClass::Equity)?,
        lookback: non_negative(
            adapter,
            "backtest",
            "lookback",
            BacktestConfig::DEFAULT_LOOKBACK as i64,
        )? as usize,
        warmup_days: non_negative(
            adapter,
            "backtest",
            "warmup_days",
            BacktestConfig::DEFAULT_WARMUP_DAYS,
        )? as i64,
        cadence,
        stop_loss_threshold: adapter.get_double(
            "backtest",
            "stop_loss_threshold",
            defaults.stop_loss_threshold,
        ),
        risk_check: parse_setting(adapter, "backtest", "risk_check", RiskCheck::default())?,
        on_missing_data: parse_setting(
            adapter,
            "backtest",
            "on_missing_data",
            MissingDataPolicy::default(),
        )?,
        risk_free_rate: adapter.get_double("backtest", "risk_free_rate", defaults.risk_free_rate),
    })
}

pub fn build_universe(
    adapter: &dyn ConfigPort,
    asset_class: AssetClass,
) -> Result<Universe, ChaintraderError> {
    let symbols = adapter
        .get_string("universe", "symbols")
        .ok_or_else(|| ChaintraderError::ConfigMissing {
            section: "universe".into(),
            key: "symbols".into(),
        })?;
    Universe::parse(asset_class, &symbols).map_err(|e| ChaintraderError::ConfigInvalid {
        section: "universe".into(),
        key: "symbols".into(),
        reason: e.to_string(),
    })
}

pub fn build_optimizer_from_config(
    adapter: &dyn ConfigPort,
) -> Result<Box<dyn OptimizerPort>, ChaintraderError> {
    let kind = parse_setting(adapter, "optimizer", "kind", OptimizerKind::default())?;
    let defaults = MeanVarianceOptimizer::default();
    let tuning = MeanVarianceOptimizer::new(
        adapter.get_double("optimizer", "risk_aversion", defaults.risk_aversion),
        non_negative(
            adapter,
            "optimizer",
            "max_iterations",
            defaults.max_iterations as i64,
        )? as usize,
        adapter.get_double("optimizer", "tolerance", defaults.tolerance),
    );
    Ok(build_optimizer(kind, tuning))
}

pub fn data_dir(adapter: &dyn ConfigPort) -> PathBuf {
    adapter
        .get_string("data", "dir")
        .map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from)
}

pub fn chain_path(chain_override: Option<&Path>, adapter: &dyn ConfigPort) -> PathBuf {
    match chain_override {
        Some(p) => p.to_path_buf(),
        None => adapter
            .get_string("chain", "path")
            .map_or_else(|| PathBuf::from(DEFAULT_CHAIN_PATH), PathBuf::from),
    }
}

fn run_backtest(
    config_path: &Path,
    name: Option<&str>,
    output_path: Option<&Path>,
    transactions_path: Option<&Path>,
    chain_override: Option<&Path>,
) -> ExitCode {
    // Stage 1: Load and validate config
    let adapter = match load_validated_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2: Build run inputs
    let inputs = build_backtest_config(&adapter).and_then(|bt_config| {
        let universe = build_universe(&adapter, bt_config.asset_class)?;
        let optimizer = build_optimizer_from_config(&adapter)?;
        Ok((bt_config, universe, optimizer))
    });
    let (bt_config, universe, optimizer) = match inputs {
        Ok(i) => i,
        Err(e) => return fail(&e),
    };

    // Stage 3: Wire adapters and run
    let price_port = CsvPriceAdapter::new(data_dir(&adapter));
    let store = JsonFileChainStore::new(chain_path(chain_override, &adapter));
    eprintln!("Result chain: {}", store.path().display());

    run_backtest_pipeline(
        &price_port,
        bt_config,
        &universe,
        optimizer,
        Box::new(store),
        name,
        output_path,
        transactions_path,
    )
}

/// Run a configured backtest, record it on the chain, print a summary and
/// optionally write the snapshot table and transaction log as CSV.
pub fn run_backtest_pipeline(
    price_port: &dyn PricePort,
    bt_config: BacktestConfig,
    universe: &Universe,
    optimizer: Box<dyn OptimizerPort>,
    chain_store: Box<dyn ChainStorePort>,
    name: Option<&str>,
    output_path: Option<&Path>,
    transactions_path: Option<&Path>,
) -> ExitCode {
    let risk_free_rate = bt_config.risk_free_rate;

    eprintln!(
        "Running backtest: {} {} symbols, {} to {}",
        universe.count(),
        universe.asset_class,
        bt_config.start_date,
        bt_config.end_date,
    );

    let mut backtest = match Backtest::new(bt_config, universe, price_port, optimizer) {
        Ok(b) => b,
        Err(e) => return fail(&e),
    };
    for skipped in backtest.skipped() {
        eprintln!("warning: skipping {} ({})", skipped.symbol, skipped.reason);
    }
    eprintln!("  Processing: {} dates", backtest.timeline().len());

    let mut ledger = match ResultLedger::open(chain_store) {
        Ok(l) => l,
        Err(e) => return fail(&e),
    };

    let run_name = name.map_or_else(generate_run_name, str::to_string);
    let (result, block) = match backtest.run_and_record(&mut ledger, &run_name) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    let metrics = result.metrics(risk_free_rate);
    print_summary(&metrics, &result);
    eprintln!("\nRecorded block {} \"{}\"", block.index, block.name);
    eprintln!("  Hash: {}", block.hash);

    if let Some(path) = output_path {
        if let Err(e) = CsvReportAdapter.write(&result, path) {
            return fail(&e);
        }
        eprintln!("\nReport written to: {}", path.display());
    }
    if let Some(path) = transactions_path {
        if let Err(e) = CsvReportAdapter.write_transactions(&result.transactions, path) {
            return fail(&e);
        }
        eprintln!("Transactions written to: {}", path.display());
    }

    ExitCode::SUCCESS
}

fn print_summary(metrics: &Metrics, result: &BacktestResult) {
    let trades = &metrics.trades;
    eprintln!("\n=== Results ===");
    eprintln!("Final Value:      {:.2}", metrics.final_value);
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!(
        "Annualized:       {:.2}%",
        metrics.annualized_return * 100.0
    );
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!(
        "Max Drawdown:     -{:.1}% ({} dates)",
        metrics.max_drawdown * 100.0,
        metrics.max_drawdown_duration
    );
    eprintln!("Rebalances:       {}", result.rebalances.len());
    eprintln!("Closed Trades:    {}", trades.total());
    eprintln!("Win Rate:         {:.1}%", trades.win_rate * 100.0);
    eprintln!("Profit Factor:    {:.2}", trades.profit_factor);

    let fallbacks = result.rebalances.iter().filter(|r| r.fallback).count();
    if fallbacks > 0 {
        eprintln!("Equal-weight fallbacks: {fallbacks}");
    }
}

/// Load the chain stored at `path`. `None` when no chain has been written
/// there yet.
pub fn load_chain(path: &Path) -> Result<Option<Chain>, ChaintraderError> {
    let blocks = JsonFileChainStore::new(path).load()?;
    if blocks.is_empty() {
        return Ok(None);
    }
    Ok(Some(Chain::from_blocks(blocks)))
}

fn run_verify(chain_path: &Path) -> ExitCode {
    eprintln!("Verifying {}", chain_path.display());
    let chain = match load_chain(chain_path) {
        Ok(Some(c)) => c,
        Ok(None) => {
            eprintln!("No chain at {}", chain_path.display());
            return ExitCode::SUCCESS;
        }
        Err(e) => return fail(&e),
    };

    match chain.ensure_valid() {
        Ok(()) => {
            println!("valid: {} blocks", chain.len());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("invalid");
            fail(&e)
        }
    }
}

fn run_show_chain(chain_path: &Path) -> ExitCode {
    match load_chain(chain_path) {
        Ok(Some(chain)) => {
            print!("{chain}");
            ExitCode::SUCCESS
        }
        Ok(None) => {
            eprintln!("No chain at {}", chain_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_expiry(symbol: &str, date: Option<NaiveDate>) -> ExitCode {
    let as_of = date.unwrap_or_else(|| Local::now().date_naive());
    match front_month_expiry(symbol, as_of) {
        Ok(expiry) => {
            println!("{expiry}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!(
                "supported symbols: {}",
                FuturesContract::SUPPORTED_SYMBOLS.join(", ")
            );
            fail(&e)
        }
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    let adapter = match load_validated_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    let universe = match build_universe(&adapter, bt_config.asset_class) {
        Ok(u) => u,
        Err(e) => return fail(&e),
    };
    let optimizer = match build_optimizer_from_config(&adapter) {
        Ok(o) => o,
        Err(e) => return fail(&e),
    };

    eprintln!("Config validated successfully");
    eprintln!("\nBacktest:");
    eprintln!("  period:       {} to {}", bt_config.start_date, bt_config.end_date);
    eprintln!("  warmup from:  {}", bt_config.fetch_start());
    eprintln!("  cash:         {:.2}", bt_config.initial_cash);
    eprintln!("  lookback:     {}", bt_config.lookback);
    eprintln!("  cadence:      {}", bt_config.cadence);
    eprintln!(
        "  stop-loss:    {:.1}% ({})",
        bt_config.stop_loss_threshold * 100.0,
        bt_config.risk_check
    );
    eprintln!("  missing data: {}", bt_config.on_missing_data);
    eprintln!("  optimizer:    {}", optimizer.name());

    eprintln!("\nUniverse ({}):", universe.asset_class);
    eprintln!("  symbols: {}", universe.symbols.join(", "));

    eprintln!("\nData dir:  {}", data_dir(&adapter).display());
    eprintln!("Chain:     {}", chain_path(None, &adapter).display());
    ExitCode::SUCCESS
}

fn run_list_symbols(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let dir = data_dir(&adapter);
    let symbols = match CsvPriceAdapter::new(dir.clone()).list_symbols() {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };

    if symbols.is_empty() {
        eprintln!("No symbols found in {}", dir.display());
    } else {
        for symbol in &symbols {
            println!("{symbol}");
        }
        eprintln!("{} symbols found", symbols.len());
    }
    ExitCode::SUCCESS
}
