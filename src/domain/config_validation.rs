//! Configuration validation.
//!
//! Checks every setting before a run is built, so a bad file fails fast
//! with the offending section and key.

use crate::domain::backtest::RiskCheck;
use crate::domain::error::ChaintraderError;
use crate::domain::instrument::AssetClass;
use crate::domain::scheduler::Cadence;
use crate::domain::universe::{MissingDataPolicy, parse_symbols};
use crate::ports::config_port::ConfigPort;
use crate::ports::optimizer_port::OptimizerKind;
use chrono::NaiveDate;
use std::str::FromStr;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    validate_initial_cash(config)?;
    validate_dates(config)?;
    validate_lookback(config)?;
    validate_warmup(config)?;
    validate_enum::<AssetClass>(config, "backtest", "asset_class")?;
    validate_cadence(config)?;
    validate_stop_loss(config)?;
    validate_enum::<RiskCheck>(config, "backtest", "risk_check")?;
    validate_enum::<MissingDataPolicy>(config, "backtest", "on_missing_data")?;
    validate_risk_free_rate(config)?;
    validate_symbols(config)?;
    validate_optimizer(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> ChaintraderError {
    ChaintraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_initial_cash(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    let value = config.get_double("backtest", "initial_cash", 0.0);
    if !(value > 0.0 && value.is_finite()) {
        return Err(invalid(
            "backtest",
            "initial_cash",
            "initial_cash must be positive",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    let start_str = config.get_string("backtest", "start_date");
    let end_str = config.get_string("backtest", "end_date");

    let start_date = parse_date(start_str.as_deref(), "start_date")?;
    let end_date = parse_date(end_str.as_deref(), "end_date")?;

    if start_date >= end_date {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

pub fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, ChaintraderError> {
    match value {
        None => Err(ChaintraderError::ConfigMissing {
            section: "backtest".to_string(),
            key: field.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            invalid(
                "backtest",
                field,
                format!("invalid {field} format, expected YYYY-MM-DD"),
            )
        }),
    }
}

fn validate_lookback(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    let value = config.get_int("backtest", "lookback", 20);
    if value < 2 {
        return Err(invalid("backtest", "lookback", "lookback must be at least 2"));
    }
    Ok(())
}

fn validate_warmup(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    let value = config.get_int("backtest", "warmup_days", 365);
    if value < 0 {
        return Err(invalid(
            "backtest",
            "warmup_days",
            "warmup_days must be non-negative",
        ));
    }
    Ok(())
}

/// An absent key is fine; a present one must parse.
fn validate_enum<T: FromStr<Err = String>>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<(), ChaintraderError> {
    match config.get_string(section, key) {
        Some(raw) => raw
            .parse::<T>()
            .map(|_| ())
            .map_err(|reason| invalid(section, key, reason)),
        None => Ok(()),
    }
}

fn validate_cadence(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    let every = config.get_int("backtest", "cadence_every", 5);
    let every = u32::try_from(every)
        .map_err(|_| invalid("backtest", "cadence_every", "cadence_every out of range"))?;
    if every == 0 {
        return Err(invalid(
            "backtest",
            "cadence_every",
            "cadence_every must be at least 1",
        ));
    }
    let kind = config
        .get_string("backtest", "cadence")
        .unwrap_or_else(|| "trading_days".to_string());
    Cadence::from_parts(&kind, every)
        .map(|_| ())
        .map_err(|reason| invalid("backtest", "cadence", reason))
}

fn validate_stop_loss(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    let value = config.get_double("backtest", "stop_loss_threshold", 0.10);
    if value <= 0.0 || value >= 1.0 {
        return Err(invalid(
            "backtest",
            "stop_loss_threshold",
            "stop_loss_threshold must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    let value = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }
    Ok(())
}

fn validate_symbols(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    match config.get_string("universe", "symbols") {
        Some(s) if !s.trim().is_empty() => parse_symbols(&s)
            .map(|_| ())
            .map_err(|e| invalid("universe", "symbols", e.to_string())),
        _ => Err(ChaintraderError::ConfigMissing {
            section: "universe".to_string(),
            key: "symbols".to_string(),
        }),
    }
}

fn validate_optimizer(config: &dyn ConfigPort) -> Result<(), ChaintraderError> {
    validate_enum::<OptimizerKind>(config, "optimizer", "kind")?;

    let risk_aversion = config.get_double("optimizer", "risk_aversion", 1.0);
    if !(risk_aversion > 0.0 && risk_aversion.is_finite()) {
        return Err(invalid(
            "optimizer",
            "risk_aversion",
            "risk_aversion must be positive",
        ));
    }
    if config.get_int("optimizer", "max_iterations", 10_000) < 1 {
        return Err(invalid(
            "optimizer",
            "max_iterations",
            "max_iterations must be at least 1",
        ));
    }
    let tolerance = config.get_double("optimizer", "tolerance", 1e-10);
    if !(tolerance > 0.0 && tolerance.is_finite()) {
        return Err(invalid("optimizer", "tolerance", "tolerance must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    const BASE: &str = "[backtest]\ninitial_cash = 100000\nstart_date = 2024-01-01\nend_date = 2024-12-31\n\n[universe]\nsymbols = AAA,BBB\n";

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    /// BASE with one `[backtest]` line swapped or added.
    fn with_backtest(line: &str) -> FileConfigAdapter {
        let key = line.split('=').next().unwrap().trim();
        let mut lines: Vec<String> = BASE
            .lines()
            .filter(|l| l.split('=').next().map(str::trim) != Some(key))
            .map(str::to_string)
            .collect();
        lines.insert(1, line.to_string());
        make_config(&lines.join("\n"))
    }

    fn invalid_key(config: &FileConfigAdapter) -> String {
        match validate_config(config).unwrap_err() {
            ChaintraderError::ConfigInvalid { key, .. } => key,
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn valid_config_passes() {
        let config = make_config(
            r#"
[backtest]
start_date = 2024-01-01
end_date = 2024-12-31
initial_cash = 100000
asset_class = commodity_future
lookback = 20
warmup_days = 365
cadence = calendar_days
cadence_every = 7
stop_loss_threshold = 0.10
risk_check = rebalance
on_missing_data = abort
risk_free_rate = 0.02

[universe]
symbols = CL=F,ZC=F

[data]
dir = data

[optimizer]
kind = equal_weight
risk_aversion = 2.0
max_iterations = 500
tolerance = 1e-8

[chain]
path = chain.json
"#,
        );
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn minimal_config_uses_defaults() {
        assert!(validate_config(&make_config(BASE)).is_ok());
    }

    #[test]
    fn initial_cash_must_be_positive() {
        assert_eq!(invalid_key(&with_backtest("initial_cash = -100")), "initial_cash");
        assert_eq!(invalid_key(&with_backtest("initial_cash = 0")), "initial_cash");
    }

    #[test]
    fn lookback_below_two_fails() {
        assert_eq!(invalid_key(&with_backtest("lookback = 1")), "lookback");
    }

    #[test]
    fn negative_warmup_fails() {
        assert_eq!(invalid_key(&with_backtest("warmup_days = -1")), "warmup_days");
    }

    #[test]
    fn invalid_start_date_format_fails() {
        assert_eq!(invalid_key(&with_backtest("start_date = 2024/01/01")), "start_date");
    }

    #[test]
    fn missing_end_date_fails() {
        let config = make_config(
            "[backtest]\ninitial_cash = 100\nstart_date = 2024-01-01\n[universe]\nsymbols = AAA\n",
        );
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ChaintraderError::ConfigMissing { key, .. } if key == "end_date"));
    }

    #[test]
    fn start_not_before_end_fails() {
        assert_eq!(invalid_key(&with_backtest("start_date = 2024-12-31")), "start_date");
    }

    #[test]
    fn unknown_enum_values_fail() {
        assert_eq!(invalid_key(&with_backtest("asset_class = bonds")), "asset_class");
        assert_eq!(invalid_key(&with_backtest("cadence = weekly")), "cadence");
        assert_eq!(invalid_key(&with_backtest("risk_check = hourly")), "risk_check");
        assert_eq!(
            invalid_key(&with_backtest("on_missing_data = retry")),
            "on_missing_data"
        );
    }

    #[test]
    fn zero_cadence_period_fails() {
        assert_eq!(invalid_key(&with_backtest("cadence_every = 0")), "cadence_every");
    }

    #[test]
    fn stop_loss_outside_unit_interval_fails() {
        assert_eq!(
            invalid_key(&with_backtest("stop_loss_threshold = 0")),
            "stop_loss_threshold"
        );
        assert_eq!(
            invalid_key(&with_backtest("stop_loss_threshold = 1.5")),
            "stop_loss_threshold"
        );
    }

    #[test]
    fn risk_free_rate_out_of_range_fails() {
        assert_eq!(invalid_key(&with_backtest("risk_free_rate = 1.5")), "risk_free_rate");
        assert_eq!(invalid_key(&with_backtest("risk_free_rate = -0.05")), "risk_free_rate");
    }

    #[test]
    fn missing_symbols_fails() {
        let config = make_config(
            "[backtest]\ninitial_cash = 100\nstart_date = 2024-01-01\nend_date = 2024-12-31\n",
        );
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ChaintraderError::ConfigMissing { key, .. } if key == "symbols"));
    }

    #[test]
    fn malformed_symbol_list_fails() {
        let config = make_config(&BASE.replace("AAA,BBB", "AAA,,BBB"));
        assert_eq!(invalid_key(&config), "symbols");
        let config = make_config(&BASE.replace("AAA,BBB", "AAA,aaa"));
        assert_eq!(invalid_key(&config), "symbols");
    }

    #[test]
    fn optimizer_settings_checked() {
        let config = make_config(&format!("{BASE}\n[optimizer]\nkind = black_litterman\n"));
        assert_eq!(invalid_key(&config), "kind");
        let config = make_config(&format!("{BASE}\n[optimizer]\nrisk_aversion = 0\n"));
        assert_eq!(invalid_key(&config), "risk_aversion");
        let config = make_config(&format!("{BASE}\n[optimizer]\nmax_iterations = 0\n"));
        assert_eq!(invalid_key(&config), "max_iterations");
        let config = make_config(&format!("{BASE}\n[optimizer]\ntolerance = -1\n"));
        assert_eq!(invalid_key(&config), "tolerance");
    }
}
