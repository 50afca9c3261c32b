//! Portfolio optimizer port trait.

use std::fmt;
use std::str::FromStr;

use crate::domain::error::OptimizerError;

/// Turns an information set into raw portfolio weights, one per asset in
/// the order of `expected_returns`.
pub trait OptimizerPort {
    fn solve(
        &self,
        expected_returns: &[f64],
        covariance: &[Vec<f64>],
    ) -> Result<Vec<f64>, OptimizerError>;

    fn name(&self) -> &'static str;
}

/// Optimizer selected by the `[optimizer] kind` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptimizerKind {
    #[default]
    MeanVariance,
    EqualWeight,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::MeanVariance => write!(f, "mean_variance"),
            OptimizerKind::EqualWeight => write!(f, "equal_weight"),
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mean_variance" => Ok(OptimizerKind::MeanVariance),
            "equal_weight" => Ok(OptimizerKind::EqualWeight),
            other => Err(format!("unknown optimizer '{other}'")),
        }
    }
}
