use crate::evolution::individual::Individual;
use crate::evolution::operators::{
    binary_tournament, repair, repair_batch, PolynomialMutation, SbxCrossover,
};
use crate::evolution::population::Population;
use crate::evolution::{EvolutionConfig, EvolutionError};
use crate::portfolio::PortfolioModel;
use rand::distributions::Uniform;
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::debug;

/// Lifecycle of an engine once built. The uninitialized state is the
/// absence of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Ready,
    Evolving,
}

/// Evaluates genomes against `model`, in parallel, keeping their order.
pub fn evaluate_genomes(genomes: Vec<Vec<f64>>, model: &PortfolioModel) -> Vec<Individual> {
    genomes
        .into_par_iter()
        .map(|genome| Individual::evaluate(genome, model))
        .collect()
}

/// Single-objective GA over portfolio weights (minimizes `-sharpe`).
///
/// Each generation: binary tournament for parents, SBX then polynomial
/// mutation (each followed by repair), parallel evaluation, and survival of
/// the best unique individuals among parents and offspring.
pub struct EvolutionEngine {
    model: PortfolioModel,
    population: Population,
    best_ever: Individual,
    generation_count: usize,
    state: EngineState,
    crossover: SbxCrossover,
    mutation: PolynomialMutation,
    duplicate_tolerance: f64,
    rng: StdRng,
}

impl EvolutionEngine {
    pub fn initialize(
        model: PortfolioModel,
        config: &EvolutionConfig,
        seed: u64,
    ) -> Result<Self, EvolutionError> {
        config.validate()?;

        let assets = model.asset_count();
        let mut rng = StdRng::seed_from_u64(seed);
        let uniform = Uniform::new(0., 1.);

        let mut genomes = (0..config.population_size)
            .map(|_| {
                (&mut rng)
                    .sample_iter(uniform)
                    .take(assets)
                    .collect::<Vec<f64>>()
            })
            .collect::<Vec<_>>();
        repair_batch(&mut genomes);

        let population = Population::new(evaluate_genomes(genomes, &model));
        let best_ever = population
            .best()
            .cloned()
            .ok_or_else(|| EvolutionError::Configuration("Population cannot be empty".into()))?;

        debug!(
            assets,
            population_size = population.len(),
            best_sharpe = best_ever.sharpe(),
            "Initial population evaluated"
        );

        Ok(EvolutionEngine {
            crossover: SbxCrossover::new(config.crossover_probability, config.crossover_eta),
            mutation: PolynomialMutation::new(
                config.mutation_probability_for(assets),
                config.mutation_eta,
            ),
            duplicate_tolerance: config.duplicate_tolerance,
            model,
            population,
            best_ever,
            generation_count: 0,
            state: EngineState::Ready,
            rng,
        })
    }

    pub fn step_generation(&mut self) {
        let size = self.population.len();
        let offspring_genomes = self.generate_offsprings(size);
        let offspring = evaluate_genomes(offspring_genomes, &self.model);

        let mut candidates =
            std::mem::replace(&mut self.population, Population::new(Vec::new())).into_individuals();
        candidates.extend(offspring);
        self.population = Population::select_survivors(candidates, size, self.duplicate_tolerance);

        self.update_best_ever();
        self.generation_count += 1;
        self.state = EngineState::Evolving;

        debug!(
            generation = self.generation_count,
            best_sharpe = self.best_ever.sharpe(),
            "Generation complete"
        );
    }

    fn generate_offsprings(&mut self, offspring_count: usize) -> Vec<Vec<f64>> {
        let pairs = (offspring_count + 1) / 2;
        let mut offsprings = Vec::with_capacity(pairs * 2);

        for _ in 0..pairs {
            let parent_1 = binary_tournament(self.population.individuals(), &mut self.rng);
            let parent_2 = binary_tournament(self.population.individuals(), &mut self.rng);

            let (mut child_1, mut child_2) = self.crossover.crossover(
                self.population.individuals()[parent_1].genome(),
                self.population.individuals()[parent_2].genome(),
                &mut self.rng,
            );
            for child in [&mut child_1, &mut child_2] {
                repair(child);
                self.mutation.mutate(child, &mut self.rng);
                repair(child);
            }

            offsprings.push(child_1);
            offsprings.push(child_2);
        }

        offsprings.truncate(offspring_count);
        offsprings
    }

    fn update_best_ever(&mut self) {
        if let Some(best) = self.population.best() {
            if best.is_better_than(&self.best_ever) {
                self.best_ever = best.clone();
            }
        }
    }

    /// Puts `newcomers` in place of the current worst individuals, the worst
    /// slot going to the first newcomer. Extra newcomers beyond the
    /// population size are ignored. Returns how many were placed.
    pub fn replace_worst(&mut self, newcomers: Vec<Individual>) -> usize {
        let slots = self.population.worst_indices(newcomers.len());
        let placed = slots.len();
        for (slot, newcomer) in slots.into_iter().zip(newcomers) {
            self.population.replace(slot, newcomer);
        }
        self.update_best_ever();
        placed
    }

    pub fn model(&self) -> &PortfolioModel {
        &self.model
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn best_ever(&self) -> &Individual {
        &self.best_ever
    }

    pub fn generation_count(&self) -> usize {
        self.generation_count
    }

    pub fn state(&self) -> EngineState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::FLOAT_COMPARISON_EPSILON;

    fn scenario_model() -> PortfolioModel {
        PortfolioModel::new(
            vec![0.08, 0.12, 0.05],
            vec![
                vec![0.04, 0., 0.],
                vec![0., 0.04, 0.],
                vec![0., 0., 0.04],
            ],
            0.02,
        )
        .unwrap()
    }

    fn scenario_config() -> EvolutionConfig {
        EvolutionConfig {
            population_size: 10,
            global_seed: Some(42),
            ..EvolutionConfig::default()
        }
    }

    #[test]
    fn test_initialize_produces_repaired_population() {
        let engine = EvolutionEngine::initialize(scenario_model(), &scenario_config(), 42).unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(engine.generation_count(), 0);
        assert_eq!(engine.population().len(), 10);
        for individual in engine.population().iter() {
            let sum: f64 = individual.genome().iter().sum();
            assert!(
                sum == 0. || (sum - 1.).abs() < FLOAT_COMPARISON_EPSILON,
                "Weights should sum to 1 (or 0). Got {}",
                sum
            );
        }
    }

    #[test]
    fn test_initialize_rejects_invalid_config() {
        let config = EvolutionConfig {
            population_size: 0,
            ..EvolutionConfig::default()
        };
        let result = EvolutionEngine::initialize(scenario_model(), &config, 1);
        assert!(matches!(result, Err(EvolutionError::Configuration(_))));
    }

    #[test]
    fn test_step_keeps_size_and_never_loses_best() {
        let mut engine =
            EvolutionEngine::initialize(scenario_model(), &scenario_config(), 42).unwrap();
        let initial_best = engine.best_ever().sharpe();
        let mut previous_fitness = engine.best_ever().fitness();

        for generation in 1..=25 {
            engine.step_generation();
            assert_eq!(engine.population().len(), 10, "Population size must not change");
            assert_eq!(engine.generation_count(), generation);
            assert!(
                engine.best_ever().fitness() <= previous_fitness,
                "Best-ever fitness worsened at generation {}",
                generation
            );
            previous_fitness = engine.best_ever().fitness();
        }
        assert_eq!(engine.state(), EngineState::Evolving);
        assert!(engine.best_ever().sharpe() >= initial_best);
    }

    #[test]
    fn test_survivors_are_unique() {
        let mut engine =
            EvolutionEngine::initialize(scenario_model(), &scenario_config(), 9).unwrap();
        for _ in 0..10 {
            engine.step_generation();
        }
        let individuals = engine.population().individuals();
        for (i, a) in individuals.iter().enumerate() {
            for b in individuals.iter().skip(i + 1) {
                assert!(!a.is_duplicate_of(b, 1e-8), "Duplicate survived selection");
            }
        }
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let mut engine_a =
            EvolutionEngine::initialize(scenario_model(), &scenario_config(), 1234).unwrap();
        let mut engine_b =
            EvolutionEngine::initialize(scenario_model(), &scenario_config(), 1234).unwrap();
        for _ in 0..5 {
            engine_a.step_generation();
            engine_b.step_generation();
        }
        assert_eq!(engine_a.best_ever(), engine_b.best_ever());
        assert_eq!(
            engine_a.population().individuals(),
            engine_b.population().individuals(),
            "A fixed seed must reproduce the run exactly"
        );
    }

    #[test]
    fn test_replace_worst_targets_worst_slots() {
        let mut engine =
            EvolutionEngine::initialize(scenario_model(), &scenario_config(), 42).unwrap();
        let worst = engine.population().worst_indices(2);
        let newcomers = evaluate_genomes(vec![vec![0., 1., 0.], vec![0.5, 0.5, 0.]], engine.model());

        let placed = engine.replace_worst(newcomers.clone());
        assert_eq!(placed, 2);
        assert_eq!(&engine.population().individuals()[worst[0]], &newcomers[0]);
        assert_eq!(&engine.population().individuals()[worst[1]], &newcomers[1]);
    }
}
