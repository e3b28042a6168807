//! Independent replicates and the flat records they export.

use crate::simulation::{Simulation, SimulationResult};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tesim_core::{build_catalogue, InteractionPair, Result, RunConfig, SimulationConfig};
use tracing::info;

/// Seeds are drawn below 2^31 so they stay readable in exported tables
const SEED_BOUND: u64 = (1 << 31) - 1;

/// One replicate that can be executed on any thread
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateJob {
    pub replicate_id: usize,
    pub seed: u64,
    pub config: SimulationConfig,
}

impl ReplicateJob {
    pub fn new(replicate_id: usize, seed: u64, config: SimulationConfig) -> Self {
        Self {
            replicate_id,
            seed,
            config,
        }
    }

    /// One job per replicate of `run`, with seeds derived from its master seed
    pub fn plan(run: &RunConfig) -> Vec<ReplicateJob> {
        derive_seeds(run.seed, run.replicates)
            .into_iter()
            .enumerate()
            .map(|(id, seed)| ReplicateJob::new(id, seed, run.simulation.clone()))
            .collect()
    }

    /// Draw the length catalogue and run every round. The seed alone
    /// determines the result.
    pub fn execute(self) -> Result<ReplicateResult> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let catalogue = build_catalogue(&self.config.families, &mut rng)?;

        info!(
            replicate_id = self.replicate_id,
            seed = self.seed,
            elements = catalogue.total_elements(),
            cells = catalogue.total_length(),
            "Starting replicate"
        );

        let mut simulation = Simulation::with_rng(self.config, catalogue, self.seed, rng)?;
        let result = simulation.run()?;

        Ok(ReplicateResult {
            replicate_id: self.replicate_id,
            seed: self.seed,
            result,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateResult {
    pub replicate_id: usize,
    pub seed: u64,
    pub result: SimulationResult,
}

impl ReplicateResult {
    /// One row per (round, tracked pair), rounds ascending
    pub fn records(&self) -> Vec<InteractionRecord> {
        self.result
            .log
            .records()
            .map(|(round_index, interaction_pair, count)| InteractionRecord {
                replicate_id: self.replicate_id,
                seed: self.seed,
                round_index,
                interaction_pair,
                count,
            })
            .collect()
    }
}

/// Flat export row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub replicate_id: usize,
    pub seed: u64,
    pub round_index: usize,
    pub interaction_pair: InteractionPair,
    pub count: u64,
}

/// Per-replicate seeds. A master seed makes them reproducible; without one
/// they come from OS entropy.
pub fn derive_seeds(master: Option<u64>, count: usize) -> Vec<u64> {
    let mut rng = match master {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    (0..count).map(|_| rng.gen_range(0..SEED_BOUND)).collect()
}

/// Interaction counts summed over every round of every replicate
pub fn pair_totals(results: &[ReplicateResult]) -> BTreeMap<InteractionPair, u64> {
    let mut totals = BTreeMap::new();
    for result in results {
        for (pair, count) in result.result.log.totals() {
            *totals.entry(pair).or_insert(0) += count;
        }
    }
    totals
}
