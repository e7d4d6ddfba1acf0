use crate::consts::DUPLICATE_TOLERANCE;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod engine;
pub mod individual;
pub mod operators;
pub mod population;
pub mod termination;

pub use engine::{EngineState, EvolutionEngine};
pub use individual::Individual;
pub use population::Population;
pub use termination::{SharpeStagnation, TerminationConfig};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvolutionError {
    #[error("Island has not been initialized.")]
    NotInitialized,
    #[error("Island is already initialized.")]
    AlreadyInitialized,
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    #[error("Invalid genome: {0}")]
    InvalidGenome(String),
}

/// Coarse error families a transport needs to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    InvalidGenome,
}

impl EvolutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvolutionError::NotInitialized
            | EvolutionError::AlreadyInitialized
            | EvolutionError::Configuration(_) => ErrorKind::Configuration,
            EvolutionError::InvalidGenome(_) => ErrorKind::InvalidGenome,
        }
    }
}

fn default_population_size() -> usize {
    100
}
fn default_crossover_probability() -> f64 {
    0.9
}
fn default_crossover_eta() -> f64 {
    15.
}
fn default_mutation_eta() -> f64 {
    20.
}
fn default_duplicate_tolerance() -> f64 {
    DUPLICATE_TOLERANCE
}
fn default_emigrant_count() -> usize {
    5
}
fn default_max_concurrency() -> usize {
    num_cpus::get()
}

/// Parameters of one island's genetic algorithm.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EvolutionConfig {
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Probability that a gene pair goes through SBX.
    #[serde(default = "default_crossover_probability")]
    pub crossover_probability: f64,
    /// SBX distribution index, higher keeps children closer to their parents.
    #[serde(default = "default_crossover_eta")]
    pub crossover_eta: f64,
    #[serde(default = "default_mutation_eta")]
    pub mutation_eta: f64,
    /// Per-gene mutation probability, `None` means `1 / assets`.
    #[serde(default)]
    pub mutation_probability: Option<f64>,
    #[serde(default = "default_duplicate_tolerance")]
    pub duplicate_tolerance: f64,
    #[serde(default)]
    pub global_seed: Option<u64>,
    #[serde(default = "default_emigrant_count")]
    pub emigrant_count: usize,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub termination: TerminationConfig,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        EvolutionConfig {
            population_size: default_population_size(),
            crossover_probability: default_crossover_probability(),
            crossover_eta: default_crossover_eta(),
            mutation_eta: default_mutation_eta(),
            mutation_probability: None,
            duplicate_tolerance: default_duplicate_tolerance(),
            global_seed: None,
            emigrant_count: default_emigrant_count(),
            max_concurrency: default_max_concurrency(),
            termination: TerminationConfig::default(),
        }
    }
}

impl EvolutionConfig {
    pub fn validate(&self) -> Result<(), EvolutionError> {
        if self.population_size < 2 {
            return Err(EvolutionError::Configuration(format!(
                "Population size must be at least 2, got {}",
                self.population_size
            )));
        }
        let probabilities = [
            ("crossover_probability", Some(self.crossover_probability)),
            ("mutation_probability", self.mutation_probability),
        ];
        for (name, probability) in probabilities {
            if let Some(p) = probability {
                if !(0. ..=1.).contains(&p) {
                    return Err(EvolutionError::Configuration(format!(
                        "{name} must lie in [0, 1], got {p}"
                    )));
                }
            }
        }
        for (name, eta) in [
            ("crossover_eta", self.crossover_eta),
            ("mutation_eta", self.mutation_eta),
        ] {
            if !eta.is_finite() || eta < 0. {
                return Err(EvolutionError::Configuration(format!(
                    "{name} must be a finite non-negative number, got {eta}"
                )));
            }
        }
        if self.max_concurrency == 0 {
            return Err(EvolutionError::Configuration(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if !self.duplicate_tolerance.is_finite() || self.duplicate_tolerance < 0. {
            return Err(EvolutionError::Configuration(
                "duplicate_tolerance must be a finite non-negative number".into(),
            ));
        }
        self.termination.validate()
    }

    pub fn mutation_probability_for(&self, assets: usize) -> f64 {
        self.mutation_probability
            .unwrap_or(1. / assets.max(1) as f64)
    }
}
