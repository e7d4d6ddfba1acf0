use crate::evolution::EvolutionError;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

fn default_n_last() -> usize {
    30
}
fn default_tol() -> f64 {
    1e-3
}
fn default_max_gen() -> usize {
    1000
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TerminationConfig {
    /// Generations over which the best fitness must move by at least `tol`.
    #[serde(default = "default_n_last")]
    pub n_last: usize,
    #[serde(default = "default_tol")]
    pub tol: f64,
    #[serde(default = "default_max_gen")]
    pub max_gen: usize,
}

impl Default for TerminationConfig {
    fn default() -> Self {
        TerminationConfig {
            n_last: default_n_last(),
            tol: default_tol(),
            max_gen: default_max_gen(),
        }
    }
}

impl TerminationConfig {
    pub fn validate(&self) -> Result<(), EvolutionError> {
        if self.n_last == 0 {
            return Err(EvolutionError::Configuration(
                "Stagnation window n_last must be at least 1".into(),
            ));
        }
        if !self.tol.is_finite() || self.tol < 0. {
            return Err(EvolutionError::Configuration(
                "Stagnation tolerance must be a finite non-negative number".into(),
            ));
        }
        Ok(())
    }
}

/// Plateau detector on the best fitness per generation, capped by `max_gen`.
///
/// Only observes fitness values; never touches a population.
#[derive(Debug, Clone)]
pub struct SharpeStagnation {
    config: TerminationConfig,
    history: VecDeque<f64>,
}

impl SharpeStagnation {
    pub fn new(config: TerminationConfig) -> Self {
        SharpeStagnation {
            config,
            history: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &TerminationConfig {
        &self.config
    }

    /// Entries needed before a plateau can be judged: the current value plus
    /// `n_last` predecessors.
    fn window_len(&self) -> usize {
        self.config.n_last.saturating_add(1)
    }

    /// Records the best fitness at the end of a generation.
    pub fn observe(&mut self, best_fitness: f64) {
        if self.history.len() >= self.window_len() {
            self.history.pop_front();
        }
        self.history.push_back(best_fitness);
    }

    pub fn history(&self) -> &VecDeque<f64> {
        &self.history
    }

    pub fn is_stagnant(&self) -> bool {
        if self.history.len() < self.window_len() {
            return false;
        }
        match (self.history.front(), self.history.back()) {
            (Some(oldest), Some(current)) => (current - oldest).abs() < self.config.tol,
            _ => false,
        }
    }

    pub fn should_stop(&self, generation_count: usize) -> bool {
        if generation_count >= self.config.max_gen {
            return true;
        }
        self.is_stagnant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(n_last: usize, tol: f64, max_gen: usize) -> SharpeStagnation {
        SharpeStagnation::new(TerminationConfig {
            n_last,
            tol,
            max_gen,
        })
    }

    #[test]
    fn test_stops_at_generation_cap_regardless_of_progress() {
        let mut stagnation = policy(3, 1e-3, 5);
        for generation in 1..=5 {
            // strong improvement every generation
            stagnation.observe(-(generation as f64));
            assert_eq!(stagnation.should_stop(generation), generation >= 5);
        }
    }

    #[test]
    fn test_plateau_signals_before_cap() {
        let mut stagnation = policy(3, 1e-3, 100);
        let mut stopped_at = None;
        for generation in 1..100 {
            stagnation.observe(-1.5);
            if stagnation.should_stop(generation) {
                stopped_at = Some(generation);
                break;
            }
        }
        // window needs n_last + 1 entries
        assert_eq!(stopped_at, Some(4), "Constant best fitness must stop after n_last + 1 records");
    }

    #[test]
    fn test_window_is_bounded_and_slides() {
        let mut stagnation = policy(2, 1e-3, 100);
        for value in [-1., -1.1, -1.2, -1.2005, -1.2008] {
            stagnation.observe(value);
        }
        assert_eq!(stagnation.history().len(), 3);
        assert_eq!(stagnation.history().front(), Some(&-1.2));
        assert!(stagnation.is_stagnant(), "Last three entries move by less than tol");
    }

    #[test]
    fn test_progress_keeps_running() {
        let mut stagnation = policy(2, 1e-3, 100);
        for value in [-1., -1.1, -1.2, -1.3] {
            stagnation.observe(value);
        }
        assert!(!stagnation.should_stop(4));
    }

    #[test]
    fn test_huge_window_from_json_never_fills() {
        let config: TerminationConfig =
            serde_json::from_str(r#"{"n_last":18446744073709551615}"#).unwrap();
        assert!(config.validate().is_ok());

        let mut stagnation = SharpeStagnation::new(config);
        for _ in 0..10 {
            stagnation.observe(-1.);
        }
        assert_eq!(stagnation.history().len(), 10);
        assert!(!stagnation.is_stagnant(), "A window of usize::MAX + 1 can never be full");
        assert!(!stagnation.should_stop(10));
    }

    #[test]
    fn test_validate() {
        assert!(TerminationConfig::default().validate().is_ok());
        let zero_window = TerminationConfig {
            n_last: 0,
            ..TerminationConfig::default()
        };
        assert!(zero_window.validate().is_err());
    }
}
