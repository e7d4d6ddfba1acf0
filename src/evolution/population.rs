use crate::evolution::individual::Individual;
use std::cmp::Ordering;

fn by_fitness(a: &Individual, b: &Individual) -> Ordering {
    a.fitness().total_cmp(&b.fitness())
}

/// Fixed-size set of evaluated individuals.
///
/// The size is set at construction and every mutating method preserves it.
#[derive(Debug, Clone)]
pub struct Population {
    individuals: Vec<Individual>,
}

impl Population {
    pub fn new(individuals: Vec<Individual>) -> Self {
        Population { individuals }
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Individual> {
        self.individuals.iter()
    }

    pub fn into_individuals(self) -> Vec<Individual> {
        self.individuals
    }

    pub fn best(&self) -> Option<&Individual> {
        self.individuals.iter().min_by(|a, b| by_fitness(a, b))
    }

    /// Indices ordered from lowest to highest fitness, ties by position.
    pub fn ranked_indices(&self) -> Vec<usize> {
        let mut indices = (0..self.individuals.len()).collect::<Vec<usize>>();
        indices.sort_by(|&a, &b| by_fitness(&self.individuals[a], &self.individuals[b]));
        indices
    }

    /// The `k` best individuals, best first.
    pub fn best_k(&self, k: usize) -> Vec<&Individual> {
        self.ranked_indices()
            .into_iter()
            .take(k)
            .map(|idx| &self.individuals[idx])
            .collect()
    }

    /// Indices of the `k` worst individuals, worst first.
    pub fn worst_indices(&self, k: usize) -> Vec<usize> {
        let mut indices = (0..self.individuals.len()).collect::<Vec<usize>>();
        indices.sort_by(|&a, &b| by_fitness(&self.individuals[b], &self.individuals[a]));
        indices.truncate(k);
        indices
    }

    /// Overwrites the slot at `index`; the size is unchanged.
    pub fn replace(&mut self, index: usize, individual: Individual) -> Individual {
        std::mem::replace(&mut self.individuals[index], individual)
    }

    /// Environmental replacement: the best `size` unique candidates.
    ///
    /// Candidates are ranked by fitness and scanned best first; one whose
    /// genome is within `tolerance` of an already kept one is skipped. If
    /// fewer than `size` unique candidates exist the remaining slots are
    /// filled with the skipped duplicates, best first, so the result always
    /// has exactly `size` members (as long as enough candidates were given).
    pub fn select_survivors(candidates: Vec<Individual>, size: usize, tolerance: f64) -> Self {
        let mut ranked = candidates;
        // stable, so equal fitness keeps parents ahead of offspring
        ranked.sort_by(by_fitness);

        let mut survivors: Vec<Individual> = Vec::with_capacity(size);
        let mut duplicates: Vec<Individual> = Vec::new();
        for candidate in ranked {
            if survivors.len() == size {
                break;
            }
            if survivors
                .iter()
                .any(|kept| kept.is_duplicate_of(&candidate, tolerance))
            {
                duplicates.push(candidate);
            } else {
                survivors.push(candidate);
            }
        }

        let missing = size - survivors.len();
        survivors.extend(duplicates.into_iter().take(missing));
        survivors.sort_by(by_fitness);

        Population::new(survivors)
    }
}
