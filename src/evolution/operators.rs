//! Variation and feasibility operators for weight-vector genomes.
//!
//! Genes live in `[GENE_LOWER_BOUND, GENE_UPPER_BOUND]`. Crossover and
//! mutation respect those bounds; [`repair`] then maps the result back onto
//! the simplex (or onto the all-zero portfolio when nothing survives the
//! threshold).

use crate::consts::{GENE_LOWER_BOUND, GENE_UPPER_BOUND, REPAIR_THRESHOLD};
use crate::evolution::individual::Individual;
use rand::prelude::*;
use std::cmp::Ordering;

/// Zeroes every weight below [`REPAIR_THRESHOLD`] and rescales the rest to sum to 1.
///
/// If nothing survives the threshold the all-zero genome is kept as is.
pub fn repair(weights: &mut [f64]) {
    weights.iter_mut().for_each(|w| {
        // NaN falls through to zero as well
        if !(*w >= REPAIR_THRESHOLD) {
            *w = 0.;
        }
    });
    let total = weights.iter().sum::<f64>();
    if total == 0. {
        return;
    }
    weights.iter_mut().for_each(|w| *w /= total);
}

pub fn repair_batch(batch: &mut [Vec<f64>]) {
    batch.iter_mut().for_each(|row| repair(row));
}

/// Simulated binary crossover on bounded genes.
#[derive(Debug, Clone, Copy)]
pub struct SbxCrossover {
    pub probability: f64,
    pub eta: f64,
}

impl SbxCrossover {
    pub fn new(probability: f64, eta: f64) -> Self {
        SbxCrossover { probability, eta }
    }

    pub fn crossover<R: Rng + ?Sized>(
        &self,
        parent_1: &[f64],
        parent_2: &[f64],
        rng: &mut R,
    ) -> (Vec<f64>, Vec<f64>) {
        let mut child_1 = parent_1.to_vec();
        let mut child_2 = parent_2.to_vec();

        for (gene_1, gene_2) in child_1.iter_mut().zip(child_2.iter_mut()) {
            if !rng.gen_bool(self.probability) {
                continue;
            }
            // identical genes have nothing to spread around
            if (*gene_1 - *gene_2).abs() <= 1e-14 {
                continue;
            }
            let (c1, c2) = self.spread(*gene_1, *gene_2, rng);
            *gene_1 = c1;
            *gene_2 = c2;
        }

        (child_1, child_2)
    }

    fn spread<R: Rng + ?Sized>(&self, x1: f64, x2: f64, rng: &mut R) -> (f64, f64) {
        let (y1, y2) = if x1 < x2 { (x1, x2) } else { (x2, x1) };
        let delta = y2 - y1;
        let exponent = 1. / (self.eta + 1.);
        let u: f64 = rng.gen();

        let beta_q = |beta: f64| {
            let alpha = 2. - beta.powf(-(self.eta + 1.));
            if u <= 1. / alpha {
                (u * alpha).powf(exponent)
            } else {
                (1. / (2. - u * alpha)).powf(exponent)
            }
        };

        let lower_beta = 1. + 2. * (y1 - GENE_LOWER_BOUND) / delta;
        let c1 = 0.5 * ((y1 + y2) - beta_q(lower_beta) * delta);
        let upper_beta = 1. + 2. * (GENE_UPPER_BOUND - y2) / delta;
        let c2 = 0.5 * ((y1 + y2) + beta_q(upper_beta) * delta);

        let c1 = c1.clamp(GENE_LOWER_BOUND, GENE_UPPER_BOUND);
        let c2 = c2.clamp(GENE_LOWER_BOUND, GENE_UPPER_BOUND);

        // randomly hand the children back so neither parent is favoured
        if rng.gen_bool(0.5) {
            (c2, c1)
        } else {
            (c1, c2)
        }
    }
}

/// Polynomial mutation on bounded genes.
#[derive(Debug, Clone, Copy)]
pub struct PolynomialMutation {
    pub probability: f64,
    pub eta: f64,
}

impl PolynomialMutation {
    pub fn new(probability: f64, eta: f64) -> Self {
        PolynomialMutation { probability, eta }
    }

    pub fn mutate<R: Rng + ?Sized>(&self, genome: &mut [f64], rng: &mut R) {
        let range = GENE_UPPER_BOUND - GENE_LOWER_BOUND;
        let exponent = 1. / (self.eta + 1.);

        for gene in genome.iter_mut() {
            if !rng.gen_bool(self.probability) {
                continue;
            }
            let y = *gene;
            let delta_1 = (y - GENE_LOWER_BOUND) / range;
            let delta_2 = (GENE_UPPER_BOUND - y) / range;
            let u: f64 = rng.gen();

            let delta_q = if u < 0.5 {
                let xy = 1. - delta_1;
                let value = 2. * u + (1. - 2. * u) * xy.powf(self.eta + 1.);
                value.powf(exponent) - 1.
            } else {
                let xy = 1. - delta_2;
                let value = 2. * (1. - u) + 2. * (u - 0.5) * xy.powf(self.eta + 1.);
                1. - value.powf(exponent)
            };

            *gene = (y + delta_q * range).clamp(GENE_LOWER_BOUND, GENE_UPPER_BOUND);
        }
    }
}

/// Binary tournament: two distinct contestants, the fitter one wins.
///
/// Returns the index of the winner in `population`.
pub fn binary_tournament<R: Rng + ?Sized>(population: &[Individual], rng: &mut R) -> usize {
    let contestants = rand::seq::index::sample(rng, population.len(), 2);
    let (a, b) = (contestants.index(0), contestants.index(1));
    match population[a].fitness().total_cmp(&population[b].fitness()) {
        Ordering::Greater => b,
        _ => a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::FLOAT_COMPARISON_EPSILON;
    use crate::portfolio::PortfolioModel;
    use rand::rngs::StdRng;

    #[test]
    fn test_repair_projects_onto_simplex() {
        let mut weights = vec![0.5, 0.2, 0.3, 0.0005];
        repair(&mut weights);
        assert_eq!(weights[3], 0., "Sub-threshold weights must be zeroed");
        let sum: f64 = weights.iter().sum();
        assert!(
            (sum - 1.).abs() < FLOAT_COMPARISON_EPSILON,
            "Repaired weights must sum to 1, got {}",
            sum
        );
        assert!(weights.iter().all(|w| *w >= 0.));
    }

    #[test]
    fn test_repair_keeps_all_zero_row() {
        let mut weights = vec![0.0001, 0.0009, 0.];
        repair(&mut weights);
        assert_eq!(weights, vec![0., 0., 0.], "All-below-threshold rows stay zero");
    }

    #[test]
    fn test_repair_zeroes_negative_and_nan_entries() {
        let mut weights = vec![-0.4, f64::NAN, 2., 2.];
        repair(&mut weights);
        assert_eq!(weights, vec![0., 0., 0.5, 0.5]);
    }

    #[test]
    fn test_repair_batch_invariant_on_random_rows() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut batch = (0..50)
            .map(|_| (0..6).map(|_| rng.gen::<f64>() * 0.01).collect::<Vec<f64>>())
            .collect::<Vec<_>>();
        repair_batch(&mut batch);
        for row in &batch {
            assert!(row.iter().all(|w| *w >= 0.));
            let sum: f64 = row.iter().sum();
            assert!(
                sum == 0. || (sum - 1.).abs() < FLOAT_COMPARISON_EPSILON,
                "Row sum must be 0 or 1, got {}",
                sum
            );
        }
    }

    #[test]
    fn test_sbx_respects_bounds_and_probability() {
        let mut rng = StdRng::seed_from_u64(11);
        let parent_1 = vec![0.1, 0.9, 0.5, 0.0];
        let parent_2 = vec![0.7, 0.2, 0.5, 1.0];

        let never = SbxCrossover::new(0., 15.);
        let (c1, c2) = never.crossover(&parent_1, &parent_2, &mut rng);
        assert_eq!(c1, parent_1, "p_c = 0 must copy the parents");
        assert_eq!(c2, parent_2);

        let always = SbxCrossover::new(1., 15.);
        for _ in 0..200 {
            let (c1, c2) = always.crossover(&parent_1, &parent_2, &mut rng);
            for gene in c1.iter().chain(c2.iter()) {
                assert!((0. ..=1.).contains(gene), "Gene {} escaped [0, 1]", gene);
            }
            // equal parent genes stay put
            assert_eq!(c1[2], 0.5);
            assert_eq!(c2[2], 0.5);
        }
    }

    #[test]
    fn test_sbx_high_eta_stays_close_to_parents() {
        let mut rng = StdRng::seed_from_u64(3);
        let sbx = SbxCrossover::new(1., 500.);
        let (c1, c2) = sbx.crossover(&[0.3], &[0.6], &mut rng);
        let mut children = [c1[0], c2[0]];
        children.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((children[0] - 0.3).abs() < 0.05);
        assert!((children[1] - 0.6).abs() < 0.05);
    }

    #[test]
    fn test_polynomial_mutation_bounds() {
        let mut rng = StdRng::seed_from_u64(5);
        let mutation = PolynomialMutation::new(1., 20.);
        for _ in 0..200 {
            let mut genome = vec![0., 0.25, 1., 0.75];
            mutation.mutate(&mut genome, &mut rng);
            assert!(genome.iter().all(|g| (0. ..=1.).contains(g)));
        }

        let untouched = PolynomialMutation::new(0., 20.);
        let mut genome = vec![0.1, 0.2];
        untouched.mutate(&mut genome, &mut rng);
        assert_eq!(genome, vec![0.1, 0.2], "p_m = 0 must not touch the genome");
    }

    #[test]
    fn test_binary_tournament_prefers_fitter() {
        let model = PortfolioModel::new(
            vec![0.08, 0.12],
            vec![vec![0.04, 0.], vec![0., 0.04]],
            0.02,
        )
        .unwrap();
        let population = vec![
            Individual::evaluate(vec![1., 0.], &model),
            Individual::evaluate(vec![0.4, 0.6], &model),
        ];
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            assert_eq!(binary_tournament(&population, &mut rng), 1);
        }
    }
}
