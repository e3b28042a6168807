//! Round driver: reset, populate, shuffle, move, repeated for every round.

use crate::grid::Grid;
use crate::movement::{policy_for, MovementPolicy};
use crate::placement::Placer;
use crate::transposition::{RelocationStats, Transposer};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tesim_core::{
    ElementTag, Error, InteractionLog, LengthCatalogue, PlacementFailurePolicy, Result,
    RoundPhase, SimulationConfig,
};
use tracing::{debug, event, info, instrument, warn, Level};

/// What happened in one completed round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: usize,
    /// Grid width at the end of the round
    pub width: usize,
    /// Fraction of occupied cells right after placement
    pub density: f64,
    pub placed: usize,
    pub placed_cells: usize,
    pub skipped_elements: usize,
    /// Order in which element types moved
    pub move_order: Vec<ElementTag>,
    pub relocation: RelocationStats,
    /// Interactions logged this round
    pub interactions: u64,
}

pub struct Simulation {
    grid: Grid,
    catalogue: LengthCatalogue,
    placer: Placer,
    transposer: Transposer,
    policies: BTreeMap<ElementTag, Box<dyn MovementPolicy>>,
    element_lengths: BTreeMap<ElementTag, usize>,
    log: InteractionLog,
    config: SimulationConfig,
    rng: ChaCha8Rng,
    seed: u64,
    phase: RoundPhase,
    rounds: Vec<RoundSummary>,
    skipped_rounds: Vec<usize>,
}

impl Simulation {
    pub fn new(config: SimulationConfig, catalogue: LengthCatalogue, seed: u64) -> Result<Self> {
        Self::with_rng(config, catalogue, seed, ChaCha8Rng::seed_from_u64(seed))
    }

    /// Continue an existing random stream, e.g. one that already drew the
    /// catalogue. `seed` is only reported.
    pub fn with_rng(
        config: SimulationConfig,
        catalogue: LengthCatalogue,
        seed: u64,
        rng: ChaCha8Rng,
    ) -> Result<Self> {
        config.validate()?;

        for tag in catalogue.tags() {
            if config.family(tag).is_none() {
                return Err(Error::Validation(format!(
                    "catalogue contains tag {} with no configured family",
                    tag
                )));
            }
        }

        let mut policies = BTreeMap::new();
        let mut element_lengths = BTreeMap::new();
        for family in config.families.iter().filter(|f| f.mobile) {
            let length = family
                .canonical_length
                .unwrap_or_else(|| mean_length(catalogue.lengths(family.tag).unwrap_or(&[])));
            policies.insert(family.tag, policy_for(&family.movement));
            element_lengths.insert(family.tag, length);
        }

        Ok(Self {
            grid: Grid::from_config(&config.grid),
            catalogue,
            placer: Placer::new(config.on_oversized),
            transposer: Transposer::new(config.interaction_rule),
            policies,
            element_lengths,
            log: InteractionLog::new(config.num_rounds, &config.tracked_pairs()),
            config,
            rng,
            seed,
            phase: RoundPhase::ResetGrid,
            rounds: Vec::new(),
            skipped_rounds: Vec::new(),
        })
    }

    /// Run every round and collect the results
    #[instrument(skip(self), fields(num_rounds = self.config.num_rounds, seed = self.seed))]
    pub fn run(&mut self) -> Result<SimulationResult> {
        info!(
            "Starting simulation: {} rounds, {} elements, grid {}x{}",
            self.config.num_rounds,
            self.catalogue.total_elements(),
            self.grid.strands(),
            self.grid.width()
        );

        for round in 0..self.config.num_rounds {
            match self.run_round(round) {
                Ok(summary) => self.rounds.push(summary),
                Err(err) if self.skippable(&err) => {
                    warn!(round, seed = self.seed, error = %err, "Skipping round");
                    self.skipped_rounds.push(round);
                }
                Err(err) => return Err(err),
            }
        }

        self.emit_run_summary();

        Ok(self.collect_results())
    }

    /// Execute one round. Errors carry the round, seed and phase.
    pub fn run_round(&mut self, round: usize) -> Result<RoundSummary> {
        self.step(round).map_err(|source| Error::RoundFailed {
            round,
            seed: self.seed,
            phase: self.phase,
            source: Box::new(source),
        })
    }

    fn step(&mut self, round: usize) -> Result<RoundSummary> {
        self.phase = RoundPhase::ResetGrid;
        self.grid.reset();

        self.phase = RoundPhase::Populate;
        let report = self.placer.populate(&mut self.grid, &self.catalogue, &mut self.rng)?;
        let density = self.grid.density();

        self.phase = RoundPhase::ShuffleMoveOrder;
        let mut move_order: Vec<ElementTag> = self.policies.keys().copied().collect();
        move_order.shuffle(&mut self.rng);

        self.phase = RoundPhase::MoveEachType;
        let mut relocation = RelocationStats::default();
        for &tag in &move_order {
            let policy = &self.policies[&tag];
            let stats = self.transposer.relocate(
                &mut self.grid,
                tag,
                self.element_lengths[&tag],
                policy.as_ref(),
                &mut self.log,
                round,
                &mut self.rng,
            )?;
            relocation.merge(&stats);
        }

        self.phase = RoundPhase::RoundComplete;

        debug!(
            round,
            width = self.grid.width(),
            density,
            placed = report.placed(),
            skipped = report.skipped.len(),
            interactions = relocation.interactions,
            "Round complete"
        );

        Ok(RoundSummary {
            round,
            width: self.grid.width(),
            density,
            placed: report.placed(),
            placed_cells: report.placed_cells,
            skipped_elements: report.skipped.len(),
            move_order,
            relocation,
            interactions: self.log.round_total(round),
        })
    }

    fn skippable(&self, err: &Error) -> bool {
        self.config.on_placement_failure == PlacementFailurePolicy::SkipRound
            && matches!(err.root(), Error::PlacementExhausted { .. })
    }

    fn emit_run_summary(&self) {
        let interactions: u64 = (0..self.log.num_rounds()).map(|r| self.log.round_total(r)).sum();
        let mean_density = if self.rounds.is_empty() {
            0.0
        } else {
            self.rounds.iter().map(|r| r.density).sum::<f64>() / self.rounds.len() as f64
        };

        info!(
            seed = self.seed,
            completed_rounds = self.rounds.len(),
            skipped_rounds = self.skipped_rounds.len(),
            final_width = self.grid.width(),
            mean_density,
            interactions,
            "Simulation complete"
        );

        for (pair, count) in self.log.totals() {
            event!(
                Level::DEBUG,
                counter_name = "interactions",
                pair = %pair,
                counter_value = count,
                "Interaction total"
            );
        }
    }

    fn collect_results(&self) -> SimulationResult {
        SimulationResult {
            seed: self.seed,
            log: self.log.clone(),
            rounds: self.rounds.clone(),
            skipped_rounds: self.skipped_rounds.clone(),
            final_width: self.grid.width(),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Occupied fraction of the grid as it stands now
    pub fn grid_density(&self) -> f64 {
        self.grid.density()
    }

    pub fn log(&self) -> &InteractionLog {
        &self.log
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Run length treated as one instance when `tag` relocates
    pub fn element_length(&self, tag: ElementTag) -> Option<usize> {
        self.element_lengths.get(&tag).copied()
    }
}

fn mean_length(lengths: &[usize]) -> usize {
    if lengths.is_empty() {
        return 1;
    }
    let mean = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
    (mean.round() as usize).max(1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub log: InteractionLog,
    pub rounds: Vec<RoundSummary>,
    pub skipped_rounds: Vec<usize>,
    pub final_width: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tesim_core::{
        FamilyConfig, GridConfig, InteractionPair, InteractionRule, LengthDistribution,
        MovementConfig, OnOversized,
    };

    fn family(tag: u8, name: &str, mobile: bool) -> FamilyConfig {
        FamilyConfig {
            tag: ElementTag(tag),
            name: name.to_string(),
            lengths: LengthDistribution::Fixed { lengths: Vec::new() },
            mobile,
            movement: MovementConfig::Unconditional,
            canonical_length: None,
        }
    }

    fn small_config(num_rounds: usize, width: usize) -> SimulationConfig {
        SimulationConfig {
            num_rounds,
            grid: GridConfig { strands: 2, width },
            families: vec![
                family(1, "exon", false),
                family(2, "retrotransposon", true),
                family(3, "dna_transposon", true),
                family(4, "non_coding", false),
            ],
            interaction_rule: InteractionRule::Covered,
            on_oversized: OnOversized::Fail,
            on_placement_failure: PlacementFailurePolicy::AbortRun,
        }
    }

    fn small_catalogue() -> LengthCatalogue {
        LengthCatalogue::new()
            .with(ElementTag(1), vec![5, 8, 3, 6])
            .with(ElementTag(2), vec![4, 4, 4])
            .with(ElementTag(3), vec![2, 2])
            .with(ElementTag(4), vec![10, 12, 9])
    }

    #[test]
    fn test_simulation_runs_every_round() {
        let mut sim = Simulation::new(small_config(5, 300), small_catalogue(), 42).unwrap();
        let result = sim.run().unwrap();

        assert_eq!(result.seed, 42);
        assert_eq!(result.rounds.len(), 5);
        assert!(result.skipped_rounds.is_empty());
        assert_eq!(result.log.num_rounds(), 5);
        assert_eq!(sim.phase(), RoundPhase::RoundComplete);

        let expected = small_catalogue().total_length() as f64 / 600.0;
        assert!((result.rounds[0].density - expected).abs() < 1e-12);
        for summary in &result.rounds {
            assert_eq!(summary.placed, 12);
            assert_eq!(summary.placed_cells, small_catalogue().total_length());
            assert_eq!(summary.relocation.visited, summary.relocation.moved);
            assert_eq!(summary.move_order.len(), 2);
            assert_eq!(summary.interactions, result.log.round_total(summary.round));
            assert_eq!(summary.relocation.interactions, summary.interactions);
        }
        assert!(result.final_width >= 300);
        assert_eq!(result.final_width, sim.grid().width());
    }

    #[test]
    fn test_every_round_keeps_every_tracked_pair() {
        let mut sim = Simulation::new(small_config(3, 300), small_catalogue(), 1).unwrap();
        let result = sim.run().unwrap();

        for round in 0..3 {
            let counts = result.log.round(round).unwrap();
            assert_eq!(counts.len(), 8);
            for pair in small_config(3, 300).tracked_pairs() {
                assert!(counts.contains_key(&pair));
            }
        }
    }

    #[test]
    fn test_same_seed_same_log() {
        let run = |seed| {
            let mut sim = Simulation::new(small_config(4, 300), small_catalogue(), seed).unwrap();
            serde_json::to_string(&sim.run().unwrap().log).unwrap()
        };

        let first = run(7);
        assert_eq!(first, run(7));
        assert!(first.contains("\"(2, 3)\""));
    }

    #[test]
    fn test_same_seed_same_log_with_growth() {
        // One wide mover on a narrow grid: most targets overflow the width.
        let catalogue = LengthCatalogue::new()
            .with(ElementTag(1), vec![2])
            .with(ElementTag(2), vec![10]);
        let mut config = small_config(10, 12);
        config.families[2].mobile = false;

        let run = || {
            let mut sim = Simulation::new(config.clone(), catalogue.clone(), 5).unwrap();
            sim.run().unwrap()
        };
        let (a, b) = (run(), run());

        assert!(a.final_width > 12);
        assert!(a.rounds.windows(2).all(|w| w[0].width <= w[1].width));
        assert_eq!(a.rounds, b.rounds);
        assert_eq!(a.final_width, b.final_width);
        assert_eq!(
            serde_json::to_string(&a.log).unwrap(),
            serde_json::to_string(&b.log).unwrap()
        );
    }

    #[test]
    fn test_canonical_length_defaults_to_catalogue_mean() {
        let mut config = small_config(1, 100);
        config.families[2].canonical_length = Some(1);
        let sim = Simulation::new(config, small_catalogue(), 0).unwrap();

        assert_eq!(sim.element_length(ElementTag(2)), Some(4));
        assert_eq!(sim.element_length(ElementTag(3)), Some(1));
        assert_eq!(sim.element_length(ElementTag(1)), None);
    }

    #[test]
    fn test_exhausted_round_aborts_run_with_context() {
        let catalogue = LengthCatalogue::new().with(ElementTag(1), vec![3, 3, 3, 3]);
        let mut config = small_config(3, 10);
        config.grid.strands = 1;

        let mut sim = Simulation::new(config, catalogue, 99).unwrap();
        let err = sim.run().unwrap_err();

        match &err {
            Error::RoundFailed { round, seed, phase, .. } => {
                assert_eq!(*round, 0);
                assert_eq!(*seed, 99);
                assert_eq!(*phase, RoundPhase::Populate);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(
            err.root(),
            Error::PlacementExhausted { tag: ElementTag(1), length: 3 }
        ));
    }

    #[test]
    fn test_exhausted_round_can_be_skipped() {
        let catalogue = LengthCatalogue::new().with(ElementTag(1), vec![3, 3, 3, 3]);
        let mut config = small_config(3, 10);
        config.grid.strands = 1;
        config.on_placement_failure = PlacementFailurePolicy::SkipRound;

        let mut sim = Simulation::new(config, catalogue, 99).unwrap();
        let result = sim.run().unwrap();

        assert_eq!(result.skipped_rounds, vec![0, 1, 2]);
        assert!(result.rounds.is_empty());
        assert_eq!(result.log.num_rounds(), 3);
        assert_eq!(result.log.round_total(0), 0);
    }

    #[test]
    fn test_unknown_catalogue_tag_is_rejected() {
        let catalogue = small_catalogue().with(ElementTag(9), vec![1]);
        assert!(matches!(
            Simulation::new(small_config(1, 100), catalogue, 0),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_only_mobile_families_are_tracked_movers() {
        let catalogue = LengthCatalogue::new()
            .with(ElementTag(1), vec![10; 4])
            .with(ElementTag(2), vec![5; 4])
            .with(ElementTag(4), vec![10; 4]);
        let mut config = small_config(10, 200);
        config.families[2].mobile = false;

        let mut sim = Simulation::new(config, catalogue, 3).unwrap();
        let result = sim.run().unwrap();

        let tracked = result.log.tracked_pairs();
        assert_eq!(tracked.len(), 4);
        assert!(tracked.iter().all(|p| p.mover == ElementTag(2)));
        let total: u64 = result.log.totals().values().sum();
        assert!(total > 0);
        assert_eq!(result.log.totals()[&InteractionPair::new(ElementTag(2), ElementTag(2))], 0);
    }
}
