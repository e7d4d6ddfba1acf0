use crate::portfolio::{compute_portfolio_performance, PortfolioModel};
use serde::Serialize;

/// One candidate portfolio together with its evaluated performance.
///
/// The cached fields are always derived from `genome`: the only way to build
/// an `Individual` is to evaluate a genome, and the genome is never handed
/// out mutably.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Individual {
    genome: Vec<f64>,
    risk: f64,
    expected_return: f64,
    sharpe: f64,
    fitness: f64,
}

impl Individual {
    pub fn evaluate(genome: Vec<f64>, model: &PortfolioModel) -> Self {
        let performance = compute_portfolio_performance(&genome, model);
        Individual {
            genome,
            risk: performance.risk,
            expected_return: performance.expected_return,
            sharpe: performance.sharpe_ratio,
            // the engine minimizes
            fitness: -performance.sharpe_ratio,
        }
    }

    pub fn genome(&self) -> &[f64] {
        &self.genome
    }

    pub fn risk(&self) -> f64 {
        self.risk
    }

    pub fn expected_return(&self) -> f64 {
        self.expected_return
    }

    pub fn sharpe(&self) -> f64 {
        self.sharpe
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub fn is_better_than(&self, other: &Individual) -> bool {
        self.fitness < other.fitness
    }

    /// Genome equality up to `tolerance` on every gene.
    pub fn is_duplicate_of(&self, other: &Individual, tolerance: f64) -> bool {
        self.genome.len() == other.genome.len()
            && self
                .genome
                .iter()
                .zip(other.genome.iter())
                .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}
