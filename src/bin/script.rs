//! Runs a whole archipelago in one process on a synthetic market: islands
//! evolve in parallel for a cycle, then pass their best genomes along a ring.
//! Stops when a cycle no longer improves the best Sharpe ratio by `tol`.

use anyhow::Context;
use archipelago::evolution::EvolutionConfig;
use archipelago::{Island, PortfolioModel};
use dotenv::dotenv;
use rand::prelude::*;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::Serialize;
use statrs::distribution::Normal;
use std::{env, str::FromStr, time::Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

/// Daily prices driven by one market factor plus idiosyncratic noise.
fn synthetic_prices(assets: usize, days: usize, seed: u64) -> anyhow::Result<Vec<Vec<f64>>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let standard = Normal::new(0., 1.).context("standard normal")?;

    let drifts = (0..assets)
        .map(|_| rng.gen_range(0.0001..0.0009))
        .collect::<Vec<f64>>();
    let betas = (0..assets)
        .map(|_| rng.gen_range(0.5..1.5))
        .collect::<Vec<f64>>();
    let idiosyncratic = (0..assets)
        .map(|_| rng.gen_range(0.005..0.02))
        .collect::<Vec<f64>>();

    let mut prices = vec![vec![100.; assets]];
    for _ in 1..days {
        let market = 0.01 * standard.sample(&mut rng);
        let last = &prices[prices.len() - 1];
        let next = (0..assets)
            .map(|i| {
                let daily = drifts[i] + betas[i] * market + idiosyncratic[i] * standard.sample(&mut rng);
                last[i] * (1. + daily)
            })
            .collect::<Vec<f64>>();
        prices.push(next);
    }
    Ok(prices)
}

#[derive(Serialize)]
struct ExperimentSummary {
    islands: usize,
    cycles: usize,
    elapsed_secs: f64,
    best_sharpe: f64,
    best_return: f64,
    best_risk: f64,
    /// (asset index, weight) for every held asset, largest first.
    allocation: Vec<(usize, f64)>,
}

fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let island_count = env_or("ISLANDS", 4usize);
    let generations_per_cycle = env_or("GENERATIONS_PER_CYCLE", 30usize);
    let max_cycles = env_or("MAX_CYCLES", 100usize);
    let convergence_tol = env_or("CONVERGENCE_TOL", 0.001f64);
    let assets = env_or("ASSETS", 30usize);
    let seed = env_or("SEED", 42u64);

    let prices = synthetic_prices(assets, 2 * 252, seed)?;
    let model = PortfolioModel::from_prices(&prices, 0.02)?;

    let base = match env::var("ARCHIPELAGO_CONFIG") {
        Ok(path) => archipelago::config::load_evolution_config(path)?,
        Err(_) => EvolutionConfig::default(),
    };
    let mut islands = (0..island_count)
        .map(|index| -> anyhow::Result<Island> {
            let mut island = Island::new(EvolutionConfig {
                global_seed: Some(seed + 1 + index as u64),
                ..base.clone()
            });
            island.initialize(model.clone())?;
            Ok(island)
        })
        .collect::<anyhow::Result<Vec<Island>>>()?;

    info!(island_count, assets, generations_per_cycle, "Starting experiment");
    let start = Instant::now();
    let mut global_best = f64::NEG_INFINITY;
    let mut cycles = 0;

    for cycle in 1..=max_cycles {
        cycles = cycle;
        let summaries = islands
            .par_iter_mut()
            .map(|island| island.evolve(generations_per_cycle))
            .collect::<Result<Vec<_>, _>>()?;
        let cycle_best = summaries
            .iter()
            .map(|summary| summary.best_sharpe)
            .fold(f64::NEG_INFINITY, f64::max);
        let improvement = cycle_best - global_best;
        info!(cycle, cycle_best, previous = global_best, improvement, "Cycle finished");

        if cycle_best <= global_best {
            info!("No improvement, stopping");
            break;
        }
        global_best = cycle_best;
        if cycle > 1 && improvement < convergence_tol {
            info!(improvement, convergence_tol, "Archipelago converged");
            break;
        }
        if summaries.iter().all(|summary| summary.terminated) {
            info!("Every island reports stagnation, stopping");
            break;
        }

        // ring: island i sends to island i + 1
        let emigrants = islands
            .iter()
            .map(|island| island.select_emigrants(base.emigrant_count))
            .collect::<Result<Vec<_>, _>>()?;
        for (source, batch) in emigrants.into_iter().enumerate() {
            let target = (source + 1) % islands.len();
            islands[target].integrate_immigrants(batch)?;
        }
    }

    let champion = islands
        .iter()
        .filter_map(|island| island.engine())
        .map(|engine| engine.best_ever())
        .max_by(|a, b| a.sharpe().total_cmp(&b.sharpe()))
        .context("No island produced a result")?;

    let mut allocation = champion
        .genome()
        .iter()
        .cloned()
        .enumerate()
        .filter(|(_, weight)| *weight > 0.)
        .collect::<Vec<_>>();
    allocation.sort_by(|a, b| b.1.total_cmp(&a.1));

    let summary = ExperimentSummary {
        islands: island_count,
        cycles,
        elapsed_secs: start.elapsed().as_secs_f64(),
        best_sharpe: champion.sharpe(),
        best_return: champion.expected_return(),
        best_risk: champion.risk(),
        allocation,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
