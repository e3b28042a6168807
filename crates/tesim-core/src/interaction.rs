//! Per-round interaction tallies.

use crate::error::{Error, Result};
use crate::types::InteractionPair;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counts of `(mover, other)` encounters, one map per round.
///
/// Every round is pre-seeded with all tracked pairs at zero, so a key is never
/// missing from a round; recording an untracked pair is an error rather than
/// a silent insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionLog {
    tracked: Vec<InteractionPair>,
    rounds: Vec<BTreeMap<InteractionPair, u64>>,
}

impl InteractionLog {
    pub fn new(num_rounds: usize, tracked_pairs: &[InteractionPair]) -> Self {
        let mut tracked = tracked_pairs.to_vec();
        tracked.sort();
        tracked.dedup();

        let seeded: BTreeMap<InteractionPair, u64> = tracked.iter().map(|&pair| (pair, 0)).collect();

        Self {
            rounds: vec![seeded; num_rounds],
            tracked,
        }
    }

    /// Increment the count for `pair` in `round`
    pub fn record(&mut self, round: usize, pair: InteractionPair) -> Result<()> {
        let num_rounds = self.rounds.len();
        let counts = self
            .rounds
            .get_mut(round)
            .ok_or(Error::RoundOutOfRange { round, num_rounds })?;
        let count = counts
            .get_mut(&pair)
            .ok_or(Error::UnknownInteractionPair(pair))?;
        *count += 1;
        Ok(())
    }

    pub fn tracked_pairs(&self) -> &[InteractionPair] {
        &self.tracked
    }

    pub fn is_tracked(&self, pair: &InteractionPair) -> bool {
        self.tracked.binary_search(pair).is_ok()
    }

    pub fn num_rounds(&self) -> usize {
        self.rounds.len()
    }

    pub fn round(&self, round: usize) -> Option<&BTreeMap<InteractionPair, u64>> {
        self.rounds.get(round)
    }

    pub fn count(&self, round: usize, pair: InteractionPair) -> u64 {
        self.rounds
            .get(round)
            .and_then(|counts| counts.get(&pair))
            .copied()
            .unwrap_or(0)
    }

    /// Sum of all pair counts in one round
    pub fn round_total(&self, round: usize) -> u64 {
        self.rounds
            .get(round)
            .map(|counts| counts.values().sum())
            .unwrap_or(0)
    }

    /// Per-pair sums across every round
    pub fn totals(&self) -> BTreeMap<InteractionPair, u64> {
        let mut totals: BTreeMap<InteractionPair, u64> = self.tracked.iter().map(|&pair| (pair, 0)).collect();
        for counts in &self.rounds {
            for (pair, count) in counts {
                *totals.entry(*pair).or_insert(0) += count;
            }
        }
        totals
    }

    /// Flatten into `(round_index, pair, count)` in round then pair order
    pub fn records(&self) -> impl Iterator<Item = (usize, InteractionPair, u64)> + '_ {
        self.rounds
            .iter()
            .enumerate()
            .flat_map(|(round, counts)| counts.iter().map(move |(pair, count)| (round, *pair, *count)))
    }
}
