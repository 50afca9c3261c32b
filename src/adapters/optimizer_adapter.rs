//! Built-in optimizers: long-only mean-variance and equal weight.

use crate::domain::error::OptimizerError;
use crate::ports::optimizer_port::{OptimizerKind, OptimizerPort};

pub const DEFAULT_RISK_AVERSION: f64 = 1.0;
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;
pub const DEFAULT_TOLERANCE: f64 = 1e-10;

/// Minimizes `-w·mu + (gamma / 2) wᵀ Σ w` over the probability simplex
/// (weights non-negative, summing to one) by projected gradient descent,
/// starting from equal weights.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanVarianceOptimizer {
    pub risk_aversion: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for MeanVarianceOptimizer {
    fn default() -> Self {
        MeanVarianceOptimizer {
            risk_aversion: DEFAULT_RISK_AVERSION,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EqualWeightOptimizer;

fn validate_inputs(expected_returns: &[f64], covariance: &[Vec<f64>]) -> Result<usize, OptimizerError> {
    let n = expected_returns.len();
    if n == 0 {
        return Err(OptimizerError::Empty);
    }
    if let Some(row) = covariance.iter().find(|row| row.len() != n) {
        return Err(OptimizerError::DimensionMismatch {
            returns: n,
            rows: covariance.len(),
            cols: row.len(),
        });
    }
    if covariance.len() != n {
        return Err(OptimizerError::DimensionMismatch {
            returns: n,
            rows: covariance.len(),
            cols: n,
        });
    }
    let all_finite = expected_returns.iter().all(|x| x.is_finite())
        && covariance.iter().flatten().all(|x| x.is_finite());
    if !all_finite {
        return Err(OptimizerError::NonFiniteInput);
    }
    Ok(n)
}

/// Euclidean projection onto `{w : w >= 0, sum(w) = 1}`.
pub fn project_onto_simplex(v: &[f64]) -> Vec<f64> {
    let mut sorted = v.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (i, u) in sorted.iter().enumerate() {
        cumulative += u;
        let candidate = (cumulative - 1.0) / (i + 1) as f64;
        if u - candidate > 0.0 {
            theta = candidate;
        }
    }

    v.iter().map(|x| (x - theta).max(0.0)).collect()
}

impl MeanVarianceOptimizer {
    pub fn new(risk_aversion: f64, max_iterations: usize, tolerance: f64) -> Self {
        MeanVarianceOptimizer {
            risk_aversion,
            max_iterations,
            tolerance,
        }
    }

    fn gradient(&self, mu: &[f64], sigma: &[Vec<f64>], w: &[f64]) -> Vec<f64> {
        sigma
            .iter()
            .zip(mu)
            .map(|(row, m)| {
                let sigma_w: f64 = row.iter().zip(w).map(|(s, x)| s * x).sum();
                self.risk_aversion * sigma_w - m
            })
            .collect()
    }
}

impl OptimizerPort for MeanVarianceOptimizer {
    fn solve(
        &self,
        expected_returns: &[f64],
        covariance: &[Vec<f64>],
    ) -> Result<Vec<f64>, OptimizerError> {
        let n = validate_inputs(expected_returns, covariance)?;

        // Gershgorin bound on the largest eigenvalue gives a safe step.
        let lipschitz = covariance
            .iter()
            .map(|row| row.iter().map(|x| x.abs()).sum::<f64>())
            .fold(0.0_f64, f64::max)
            * self.risk_aversion.abs();
        let step = 1.0 / lipschitz.max(1e-12);

        let mut weights = vec![1.0 / n as f64; n];
        for iteration in 0..self.max_iterations {
            let grad = self.gradient(expected_returns, covariance, &weights);
            let stepped: Vec<f64> = weights
                .iter()
                .zip(&grad)
                .map(|(w, g)| w - step * g)
                .collect();
            let next = project_onto_simplex(&stepped);

            if next.iter().any(|x| !x.is_finite()) {
                return Err(OptimizerError::MalformedOutput(format!(
                    "non-finite weight at iteration {iteration}"
                )));
            }

            let change = next
                .iter()
                .zip(&weights)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0_f64, f64::max);
            weights = next;
            if change <= self.tolerance {
                return Ok(weights);
            }
        }

        Err(OptimizerError::NonConvergence {
            iterations: self.max_iterations,
        })
    }

    fn name(&self) -> &'static str {
        "mean_variance"
    }
}

impl OptimizerPort for EqualWeightOptimizer {
    fn solve(
        &self,
        expected_returns: &[f64],
        covariance: &[Vec<f64>],
    ) -> Result<Vec<f64>, OptimizerError> {
        let n = validate_inputs(expected_returns, covariance)?;
        Ok(vec![1.0 / n as f64; n])
    }

    fn name(&self) -> &'static str {
        "equal_weight"
    }
}

/// Construct the optimizer named by `kind`. The tuning parameters only
/// apply to mean-variance.
pub fn build_optimizer(kind: OptimizerKind, tuning: MeanVarianceOptimizer) -> Box<dyn OptimizerPort> {
    match kind {
        OptimizerKind::MeanVariance => Box::new(tuning),
        OptimizerKind::EqualWeight => Box::new(EqualWeightOptimizer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sum(w: &[f64]) -> f64 {
        w.iter().sum()
    }

    #[test]
    fn simplex_projection_of_point_inside() {
        let p = project_onto_simplex(&[0.2, 0.3, 0.5]);
        assert_abs_diff_eq!(p[0], 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(p[1], 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(p[2], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn simplex_projection_clips_negatives() {
        let p = project_onto_simplex(&[2.0, -1.0, 0.0]);
        assert_abs_diff_eq!(p[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p[2], 0.0, epsilon = 1e-12);

        let p = project_onto_simplex(&[0.0, 0.0]);
        assert_abs_diff_eq!(p[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(p[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn zero_information_keeps_equal_weights() {
        let w = MeanVarianceOptimizer::default()
            .solve(&[0.0, 0.0], &[vec![0.0, 0.0], vec![0.0, 0.0]])
            .unwrap();
        assert_abs_diff_eq!(w[0], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(w[1], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn uncorrelated_equal_variance_tilts_to_higher_return() {
        // Closed form for two uncorrelated assets with variance s:
        // w1 = 1/2 + (mu1 - mu2) / (2 * gamma * s).
        let s = 0.04;
        let w = MeanVarianceOptimizer::default()
            .solve(&[0.01, 0.0], &[vec![s, 0.0], vec![0.0, s]])
            .unwrap();
        assert_abs_diff_eq!(w[0], 0.5 + 0.01 / (2.0 * s), epsilon = 1e-6);
        assert_abs_diff_eq!(sum(&w), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn minimum_variance_when_returns_equal() {
        // Inverse-variance weights for uncorrelated assets.
        let w = MeanVarianceOptimizer::default()
            .solve(&[0.0, 0.0], &[vec![0.01, 0.0], vec![0.0, 0.04]])
            .unwrap();
        assert_abs_diff_eq!(w[0], 0.8, epsilon = 1e-6);
        assert_abs_diff_eq!(w[1], 0.2, epsilon = 1e-6);
    }

    #[test]
    fn dominant_asset_takes_everything() {
        let w = MeanVarianceOptimizer::default()
            .solve(&[1.0, 0.0, 0.0], &[
                vec![0.01, 0.0, 0.0],
                vec![0.0, 0.01, 0.0],
                vec![0.0, 0.0, 0.01],
            ])
            .unwrap();
        assert_abs_diff_eq!(w[0], 1.0, epsilon = 1e-9);
        assert!(w.iter().all(|x| *x >= 0.0));
    }

    #[test]
    fn rejects_bad_inputs() {
        let opt = MeanVarianceOptimizer::default();
        assert_eq!(opt.solve(&[], &[]), Err(OptimizerError::Empty));
        assert!(matches!(
            opt.solve(&[0.0, 0.0], &[vec![1.0]]),
            Err(OptimizerError::DimensionMismatch { .. })
        ));
        assert_eq!(
            opt.solve(&[f64::NAN], &[vec![1.0]]),
            Err(OptimizerError::NonFiniteInput)
        );
    }

    #[test]
    fn reports_non_convergence() {
        let opt = MeanVarianceOptimizer::new(1.0, 1, 0.0);
        assert_eq!(
            opt.solve(&[0.01, 0.0], &[vec![0.04, 0.0], vec![0.0, 0.04]]),
            Err(OptimizerError::NonConvergence { iterations: 1 })
        );
    }

    #[test]
    fn builds_by_kind() {
        let opt = build_optimizer(OptimizerKind::EqualWeight, MeanVarianceOptimizer::default());
        assert_eq!(opt.name(), "equal_weight");
        let opt = build_optimizer(OptimizerKind::MeanVariance, MeanVarianceOptimizer::default());
        assert_eq!(opt.name(), "mean_variance");
    }

    #[test]
    fn equal_weight_solver() {
        let w = EqualWeightOptimizer
            .solve(&[0.3, -0.1, 0.0, 0.2], &vec![vec![0.0; 4]; 4])
            .unwrap();
        assert_eq!(w, vec![0.25; 4]);
        assert_eq!(EqualWeightOptimizer.name(), "equal_weight");
    }
}
