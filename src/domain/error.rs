//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for chaintrader.
#[derive(Debug, thiserror::Error)]
pub enum ChaintraderError {
    #[error("data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("invalid price series for {symbol}: {reason}")]
    InvalidSeries { symbol: String, reason: String },

    #[error(
        "insufficient cash to buy {quantity} {symbol} at {price} on {date}: need {required:.2}, have {available:.2}"
    )]
    InsufficientCash {
        symbol: String,
        date: NaiveDate,
        quantity: i64,
        price: f64,
        required: f64,
        available: f64,
    },

    #[error("no open position in {symbol} to {action} on {date}")]
    NoPosition {
        symbol: String,
        date: NaiveDate,
        action: &'static str,
    },

    #[error("invalid order for {symbol}: {reason}")]
    InvalidOrder { symbol: String, reason: String },

    #[error("no price for {symbol} on or before {date}")]
    MissingPrice { symbol: String, date: NaiveDate },

    #[error("no instrument has {lookback} observations on {date}")]
    EmptyUniverse { date: NaiveDate, lookback: usize },

    #[error("chain integrity violated at block {index}: {reason}")]
    ChainIntegrity { index: usize, reason: String },

    #[error("backtest is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unsupported futures contract: {symbol}")]
    UnsupportedContract { symbol: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure modes of a weight optimizer. These never abort a run; the
/// information window falls back to equal weights instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OptimizerError {
    #[error("no assets to optimize")]
    Empty,

    #[error("dimension mismatch: {returns} expected returns, covariance is {rows}x{cols}")]
    DimensionMismatch {
        returns: usize,
        rows: usize,
        cols: usize,
    },

    #[error("non-finite value in optimizer input")]
    NonFiniteInput,

    #[error("did not converge within {iterations} iterations")]
    NonConvergence { iterations: usize },

    #[error("malformed optimizer output: {0}")]
    MalformedOutput(String),
}

impl ChaintraderError {
    /// Whether the error only disqualifies a single instrument.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ChaintraderError::DataUnavailable { .. }
                | ChaintraderError::InvalidSeries { .. }
                | ChaintraderError::UnsupportedContract { .. }
        )
    }
}

impl From<&ChaintraderError> for std::process::ExitCode {
    fn from(err: &ChaintraderError) -> Self {
        let code: u8 = match err {
            ChaintraderError::Io(_) | ChaintraderError::Serialization(_) => 1,
            ChaintraderError::ConfigParse { .. }
            | ChaintraderError::ConfigMissing { .. }
            | ChaintraderError::ConfigInvalid { .. } => 2,
            ChaintraderError::DataUnavailable { .. }
            | ChaintraderError::InvalidSeries { .. }
            | ChaintraderError::MissingPrice { .. }
            | ChaintraderError::UnsupportedContract { .. }
            | ChaintraderError::EmptyUniverse { .. } => 3,
            ChaintraderError::InsufficientCash { .. }
            | ChaintraderError::NoPosition { .. }
            | ChaintraderError::InvalidOrder { .. }
            | ChaintraderError::InvalidState { .. } => 4,
            ChaintraderError::ChainIntegrity { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
