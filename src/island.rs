use crate::evolution::engine::{evaluate_genomes, EvolutionEngine};
use crate::evolution::operators::repair_batch;
use crate::evolution::{EvolutionConfig, EvolutionError, SharpeStagnation};
use crate::portfolio::PortfolioModel;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct InitSummary {
    pub asset_count: usize,
    pub seed: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct EvolveSummary {
    pub best_sharpe: f64,
    pub generations_run: usize,
    /// Whether the stagnation policy now asks to stop.
    pub terminated: bool,
}

/// Best-known result of an island.
///
/// `NoResultYet` is distinct from a genuine Sharpe ratio of zero.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IslandStatus {
    NoResultYet,
    Evaluated { best_sharpe: f64, generation: usize },
}

impl IslandStatus {
    pub fn best_sharpe(&self) -> Option<f64> {
        match self {
            IslandStatus::NoResultYet => None,
            IslandStatus::Evaluated { best_sharpe, .. } => Some(*best_sharpe),
        }
    }
}

/// One unit of the island model: an engine, its population and its model,
/// plus the migration operations a coordinator calls.
///
/// Not internally synchronized; callers must serialize access (one owner, or
/// one lock per island).
pub struct Island {
    config: EvolutionConfig,
    stagnation: SharpeStagnation,
    engine: Option<EvolutionEngine>,
}

impl Island {
    pub fn new(config: EvolutionConfig) -> Self {
        Island {
            stagnation: SharpeStagnation::new(config.termination),
            config,
            engine: None,
        }
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine(&self) -> Option<&EvolutionEngine> {
        self.engine.as_ref()
    }

    fn engine_mut(&mut self) -> Result<&mut EvolutionEngine, EvolutionError> {
        self.engine.as_mut().ok_or(EvolutionError::NotInitialized)
    }

    fn engine_ref(&self) -> Result<&EvolutionEngine, EvolutionError> {
        self.engine.as_ref().ok_or(EvolutionError::NotInitialized)
    }

    pub fn initialize(&mut self, model: PortfolioModel) -> Result<InitSummary, EvolutionError> {
        if self.engine.is_some() {
            return Err(EvolutionError::AlreadyInitialized);
        }
        let seed = self.config.global_seed.unwrap_or_else(rand::random);
        let engine = EvolutionEngine::initialize(model, &self.config, seed)?;
        let asset_count = engine.model().asset_count();

        info!(
            asset_count,
            population_size = self.config.population_size,
            seed,
            best_sharpe = engine.best_ever().sharpe(),
            "Island initialized"
        );
        self.engine = Some(engine);

        Ok(InitSummary { asset_count, seed })
    }

    /// Runs exactly `generations` generations. `terminated` in the summary
    /// reports whether the stagnation policy (or its generation cap) asks to
    /// stop; acting on it is left to the coordinator.
    pub fn evolve(&mut self, generations: usize) -> Result<EvolveSummary, EvolutionError> {
        if generations == 0 {
            return Err(EvolutionError::Configuration(
                "generations must be at least 1".into(),
            ));
        }
        let engine = self
            .engine
            .as_mut()
            .ok_or(EvolutionError::NotInitialized)?;

        for _ in 0..generations {
            engine.step_generation();
            self.stagnation.observe(engine.best_ever().fitness());
        }
        let generations_run = generations;
        let terminated = self.stagnation.should_stop(engine.generation_count());
        if terminated {
            info!(
                generation = engine.generation_count(),
                stagnant = self.stagnation.is_stagnant(),
                "Island reached its stop condition"
            );
        }

        let summary = EvolveSummary {
            best_sharpe: engine.best_ever().sharpe(),
            generations_run,
            terminated,
        };
        info!(
            generations_run,
            generation = engine.generation_count(),
            best_sharpe = summary.best_sharpe,
            terminated,
            "Evolution step finished"
        );
        Ok(summary)
    }

    /// Genomes of the `count` best individuals, best first. The population is
    /// left untouched.
    pub fn select_emigrants(&self, count: usize) -> Result<Vec<Vec<f64>>, EvolutionError> {
        let engine = self.engine_ref()?;
        let emigrants = engine
            .population()
            .best_k(count)
            .into_iter()
            .map(|individual| individual.genome().to_vec())
            .collect::<Vec<_>>();
        info!(requested = count, sent = emigrants.len(), "Emigrants selected");
        Ok(emigrants)
    }

    /// Repairs and evaluates incoming genomes against the local model, then
    /// swaps them in for the current worst individuals.
    ///
    /// The whole batch is rejected, leaving the population untouched, if any
    /// genome has the wrong length or a non-finite entry. Immigrants are not
    /// checked against resident genomes for duplicates.
    pub fn integrate_immigrants(
        &mut self,
        mut genomes: Vec<Vec<f64>>,
    ) -> Result<usize, EvolutionError> {
        let engine = self.engine_mut()?;
        let assets = engine.model().asset_count();

        for (position, genome) in genomes.iter().enumerate() {
            if genome.len() != assets {
                warn!(position, len = genome.len(), assets, "Rejecting immigrant batch");
                return Err(EvolutionError::InvalidGenome(format!(
                    "Immigrant {position} has {} genes, expected {assets}",
                    genome.len()
                )));
            }
            if genome.iter().any(|gene| !gene.is_finite()) {
                warn!(position, "Rejecting immigrant batch");
                return Err(EvolutionError::InvalidGenome(format!(
                    "Immigrant {position} has non-finite genes"
                )));
            }
        }

        genomes.truncate(engine.population().len());
        repair_batch(&mut genomes);
        let immigrants = evaluate_genomes(genomes, engine.model());
        let integrated = engine.replace_worst(immigrants);

        info!(integrated, "Immigrants integrated");
        Ok(integrated)
    }

    pub fn status(&self) -> IslandStatus {
        match &self.engine {
            None => IslandStatus::NoResultYet,
            Some(engine) => IslandStatus::Evaluated {
                best_sharpe: engine.best_ever().sharpe(),
                generation: engine.generation_count(),
            },
        }
    }
}
