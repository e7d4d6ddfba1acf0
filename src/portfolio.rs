use crate::consts::{DEFAULT_RISK_FREE_RATE, FLOAT_COMPARISON_EPSILON};
use crate::evolution::EvolutionError;
use crate::statistics::annualized_statistics;
use itertools::izip;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

fn default_risk_free_rate() -> f64 {
    DEFAULT_RISK_FREE_RATE
}

/// Unchecked wire shape of a [`PortfolioModel`].
#[derive(Deserialize, Debug, Clone)]
pub struct RawPortfolioModel {
    pub mu: Vec<f64>,
    pub cov: Vec<Vec<f64>>,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
}

/// Expected returns and covariance for N assets.
///
/// Only constructible through validation: `mu` and `cov` agree on N, every
/// entry is finite, and `cov` is symmetric positive-semidefinite. That keeps
/// the risk term real for every weight vector the engine can produce.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "RawPortfolioModel")]
pub struct PortfolioModel {
    mu: Vec<f64>,
    cov: Vec<Vec<f64>>,
    risk_free_rate: f64,
}

impl TryFrom<RawPortfolioModel> for PortfolioModel {
    type Error = EvolutionError;

    fn try_from(raw: RawPortfolioModel) -> Result<Self, Self::Error> {
        PortfolioModel::new(raw.mu, raw.cov, raw.risk_free_rate)
    }
}

impl PortfolioModel {
    pub fn new(
        mu: Vec<f64>,
        cov: Vec<Vec<f64>>,
        risk_free_rate: f64,
    ) -> Result<Self, EvolutionError> {
        let n = mu.len();
        if n == 0 {
            return Err(EvolutionError::Configuration(
                "Expected returns cannot be empty".into(),
            ));
        }
        if cov.len() != n || cov.iter().any(|row| row.len() != n) {
            return Err(EvolutionError::Configuration(format!(
                "Covariance must be a {n}x{n} matrix to match {n} expected returns"
            )));
        }
        if !risk_free_rate.is_finite()
            || mu.iter().any(|m| !m.is_finite())
            || cov.iter().flatten().any(|c| !c.is_finite())
        {
            return Err(EvolutionError::Configuration(
                "Portfolio model contains non-finite values".into(),
            ));
        }

        for i in 0..n {
            for j in (i + 1)..n {
                let scale = 1f64.max(cov[i][j].abs()).max(cov[j][i].abs());
                if (cov[i][j] - cov[j][i]).abs() > FLOAT_COMPARISON_EPSILON * scale {
                    return Err(EvolutionError::Configuration(format!(
                        "Covariance is not symmetric at ({i}, {j})"
                    )));
                }
            }
        }

        let matrix = DMatrix::from_fn(n, n, |i, j| cov[i][j]);
        let eigenvalues = matrix.symmetric_eigenvalues();
        let largest = eigenvalues.iter().fold(0f64, |acc, e| acc.max(e.abs()));
        let smallest = eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min);
        if smallest < -FLOAT_COMPARISON_EPSILON * largest.max(1.) {
            return Err(EvolutionError::Configuration(format!(
                "Covariance is not positive-semidefinite (smallest eigenvalue {smallest:e})"
            )));
        }

        Ok(PortfolioModel {
            mu,
            cov,
            risk_free_rate,
        })
    }

    /// Builds the model from a price history (rows are dates, columns assets).
    pub fn from_prices(prices: &[Vec<f64>], risk_free_rate: f64) -> Result<Self, EvolutionError> {
        let (mu, cov) = annualized_statistics(prices)?;
        PortfolioModel::new(mu, cov, risk_free_rate)
    }

    pub fn asset_count(&self) -> usize {
        self.mu.len()
    }

    pub fn mu(&self) -> &[f64] {
        &self.mu
    }

    pub fn cov(&self) -> &[Vec<f64>] {
        &self.cov
    }

    pub fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PortfolioPerformance {
    pub expected_return: f64,
    pub risk: f64,
    pub sharpe_ratio: f64,
}

/// Mean-variance performance of `weights` under `model`.
///
/// A riskless portfolio (including the all-zero "invest nothing" genome) gets
/// a Sharpe ratio of exactly 0.
pub fn compute_portfolio_performance(
    weights: &[f64],
    model: &PortfolioModel,
) -> PortfolioPerformance {
    debug_assert_eq!(weights.len(), model.asset_count());

    let expected_return = izip!(weights, model.mu())
        .map(|(w, m)| w * m)
        .sum::<f64>();

    let variance = izip!(weights, model.cov())
        .filter(|(w, _)| **w != 0.)
        .map(|(w_i, row)| w_i * izip!(weights, row).map(|(w_j, c)| w_j * c).sum::<f64>())
        .sum::<f64>();
    // round-off can push a PSD quadratic form just below zero
    let risk = variance.max(0.).sqrt();

    let sharpe_ratio = if risk == 0. {
        0.
    } else {
        (expected_return - model.risk_free_rate()) / risk
    };

    PortfolioPerformance {
        expected_return,
        risk,
        sharpe_ratio,
    }
}
