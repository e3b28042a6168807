//! Configuration types for the simulation.

use crate::error::{Error, Result};
use crate::types::{ElementTag, InteractionPair};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Scale divisor applied by `SimulationConfig::default()` to the fly genome.
pub const DEFAULT_SCALE: u64 = 1000;

/// Truncation windows beyond this many standard deviations are rejected
const TRUNCATION_SIGMAS: f64 = 6.0;

/// Grid dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Number of parallel rows (strands)
    pub strands: usize,
    /// Initial number of columns; relocation may grow it
    pub width: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            strands: 2,
            width: 180_000,
        }
    }
}

/// How the lengths of one element family are drawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "snake_case")]
pub enum LengthDistribution {
    /// Explicit lengths, used as-is
    Fixed { lengths: Vec<usize> },
    /// Normal distribution truncated to `[min, max]`, rounded to integers
    TruncatedNormal {
        mean: f64,
        min: f64,
        max: f64,
        std_dev: f64,
        count: usize,
    },
    /// Uniform over `[low, high]`, rounded to integers. When `max_total` is
    /// set, the whole draw is repeated until its sum fits.
    Uniform {
        low: f64,
        high: f64,
        count: usize,
        #[serde(default)]
        max_total: Option<usize>,
    },
}

/// Cut-and-paste moves the element; copy-and-paste leaves the original behind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveMode {
    Cut,
    Copy,
}

/// Per-family movement policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum MovementConfig {
    /// Every instance is cut and pasted exactly once per round
    #[default]
    Unconditional,
    /// Each instance is first lost with `excision_probability`, otherwise
    /// moved with `move_probability` using `mode`
    Stochastic {
        move_probability: f64,
        mode: MoveMode,
        #[serde(default)]
        excision_probability: f64,
    },
}

/// One element family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyConfig {
    pub tag: ElementTag,
    pub name: String,
    pub lengths: LengthDistribution,
    /// Mobile families are relocated every round
    #[serde(default)]
    pub mobile: bool,
    #[serde(default)]
    pub movement: MovementConfig,
    /// Run length treated as one instance during relocation. Defaults to the
    /// rounded mean of the family's catalogue.
    #[serde(default)]
    pub canonical_length: Option<usize>,
}

/// Which cells count as an encounter when a mover lands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InteractionRule {
    /// Every foreign run intersecting the target span counts once
    #[default]
    Covered,
    /// Only the two cells immediately left and right of the target span
    Flanking,
}

/// What to do with a catalogue length wider than the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnOversized {
    Skip,
    #[default]
    Fail,
}

/// What the round driver does when a round cannot be populated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlacementFailurePolicy {
    #[default]
    AbortRun,
    SkipRound,
}

/// Configuration of one simulation run (one replicate)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub num_rounds: usize,
    pub grid: GridConfig,
    pub families: Vec<FamilyConfig>,
    pub interaction_rule: InteractionRule,
    pub on_oversized: OnOversized,
    pub on_placement_failure: PlacementFailurePolicy,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::drosophila(DEFAULT_SCALE)
    }
}

impl SimulationConfig {
    /// Fly genome statistics with genome size and element counts divided by
    /// `scale`. Element lengths are left untouched.
    pub fn drosophila(scale: u64) -> Self {
        let scale = scale.max(1) as f64;

        let genome_size = (180_000_000.0 / scale).round().max(1.0);
        let num_genes = (14_000.0 / scale).round().max(1.0);
        let mean_gene_length = 462.0;
        let (min_gene_length, max_gene_length) = (2.0, 14_544.0);

        let (retro_mean, dna_mean) = (2869.0, 2180.0);
        let genome_minus_exons = genome_size - num_genes * mean_gene_length;
        let num_retro = (genome_minus_exons * 0.18 / retro_mean).floor().max(1.0);
        let num_dna = (genome_minus_exons * 0.02 / dna_mean).floor().max(1.0);

        let coding = num_genes * mean_gene_length + num_retro * retro_mean + num_dna * dna_mean;
        let non_coding_length = (genome_size - coding).max(0.0);
        let num_segments = (5_000.0 / scale).round().max(1.0);
        let segment_high = (non_coding_length / num_segments).max(100.0);

        Self {
            num_rounds: 10,
            grid: GridConfig {
                strands: 2,
                width: genome_size as usize,
            },
            families: vec![
                FamilyConfig {
                    tag: ElementTag::EXON,
                    name: "exon".to_string(),
                    lengths: LengthDistribution::TruncatedNormal {
                        mean: mean_gene_length,
                        min: min_gene_length,
                        max: max_gene_length,
                        std_dev: (max_gene_length - min_gene_length) / 6.0,
                        count: num_genes as usize,
                    },
                    mobile: false,
                    movement: MovementConfig::Unconditional,
                    canonical_length: None,
                },
                FamilyConfig {
                    tag: ElementTag::RETROTRANSPOSON,
                    name: "retrotransposon".to_string(),
                    lengths: LengthDistribution::TruncatedNormal {
                        mean: retro_mean,
                        min: 215.0,
                        max: 7490.0,
                        std_dev: 3213.0,
                        count: num_retro as usize,
                    },
                    mobile: true,
                    movement: MovementConfig::Unconditional,
                    canonical_length: None,
                },
                FamilyConfig {
                    tag: ElementTag::DNA_TRANSPOSON,
                    name: "dna_transposon".to_string(),
                    lengths: LengthDistribution::TruncatedNormal {
                        mean: dna_mean,
                        min: 52.0,
                        max: 5453.0,
                        std_dev: 2013.0,
                        count: num_dna as usize,
                    },
                    mobile: true,
                    movement: MovementConfig::Unconditional,
                    canonical_length: None,
                },
                FamilyConfig {
                    tag: ElementTag::NON_CODING,
                    name: "non_coding".to_string(),
                    lengths: LengthDistribution::Uniform {
                        low: 100.0,
                        high: segment_high,
                        count: num_segments as usize,
                        max_total: Some(non_coding_length as usize),
                    },
                    mobile: false,
                    movement: MovementConfig::Unconditional,
                    canonical_length: None,
                },
            ],
            interaction_rule: InteractionRule::Covered,
            on_oversized: OnOversized::Fail,
            on_placement_failure: PlacementFailurePolicy::AbortRun,
        }
    }

    pub fn family(&self, tag: ElementTag) -> Option<&FamilyConfig> {
        self.families.iter().find(|f| f.tag == tag)
    }

    /// All family tags in configuration order
    pub fn family_tags(&self) -> Vec<ElementTag> {
        self.families.iter().map(|f| f.tag).collect()
    }

    /// Tags relocated every round, in configuration order
    pub fn mobile_tags(&self) -> Vec<ElementTag> {
        self.families.iter().filter(|f| f.mobile).map(|f| f.tag).collect()
    }

    /// Keys pre-seeded into every round of the interaction log
    pub fn tracked_pairs(&self) -> Vec<InteractionPair> {
        InteractionPair::tracked(&self.mobile_tags(), &self.family_tags())
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_rounds == 0 {
            return Err(Error::Validation("num_rounds must be at least 1".to_string()));
        }
        if self.grid.strands == 0 || self.grid.width == 0 {
            return Err(Error::Validation(format!(
                "grid must have at least one strand and one column (got {}x{})",
                self.grid.strands, self.grid.width
            )));
        }
        if self.families.is_empty() {
            return Err(Error::Validation("at least one element family is required".to_string()));
        }

        let mut seen = HashSet::new();
        for family in &self.families {
            if family.tag.is_empty() {
                return Err(Error::Validation(format!(
                    "family '{}' uses the reserved empty tag 0",
                    family.name
                )));
            }
            if !seen.insert(family.tag) {
                return Err(Error::Validation(format!("duplicate family tag {}", family.tag)));
            }
            if family.canonical_length == Some(0) {
                return Err(Error::Validation(format!(
                    "family '{}' has a canonical length of 0",
                    family.name
                )));
            }
            if let MovementConfig::Stochastic {
                move_probability,
                excision_probability,
                ..
            } = family.movement
            {
                for (label, p) in [("move_probability", move_probability), ("excision_probability", excision_probability)] {
                    if !(0.0..=1.0).contains(&p) {
                        return Err(Error::Validation(format!(
                            "family '{}': {} must be within [0, 1] (got {})",
                            family.name, label, p
                        )));
                    }
                }
            }
            family.lengths.validate(&family.name)?;
        }

        Ok(())
    }
}

impl LengthDistribution {
    fn validate(&self, family: &str) -> Result<()> {
        match self {
            LengthDistribution::Fixed { .. } => Ok(()),
            LengthDistribution::TruncatedNormal { mean, min, max, std_dev, .. } => {
                if !(std_dev.is_finite() && *std_dev > 0.0)
                    || !(mean.is_finite() && min.is_finite() && max.is_finite())
                    || min > max
                {
                    return Err(Error::Validation(format!(
                        "family '{}': truncated normal needs std_dev > 0 and min <= max",
                        family
                    )));
                }
                let reach = TRUNCATION_SIGMAS * std_dev;
                if min != max && (*min > mean + reach || *max < mean - reach) {
                    return Err(Error::Validation(format!(
                        "family '{}': window [{}, {}] lies more than {} standard deviations from mean {}",
                        family, min, max, TRUNCATION_SIGMAS, mean
                    )));
                }
                Ok(())
            }
            LengthDistribution::Uniform { low, high, .. } => {
                if !(low.is_finite() && high.is_finite()) || low > high {
                    return Err(Error::Validation(format!(
                        "family '{}': uniform needs low <= high (got {}..{})",
                        family, low, high
                    )));
                }
                Ok(())
            }
        }
    }
}

/// A full experiment: several independent replicates of one simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub simulation: SimulationConfig,
    /// Number of independent replicates
    pub replicates: usize,
    /// Master seed; absent means seeds come from OS entropy
    pub seed: Option<u64>,
    /// Replicates executed at the same time
    pub max_concurrent_replicates: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationConfig::default(),
            replicates: 1,
            seed: None,
            max_concurrent_replicates: 1,
        }
    }
}

impl RunConfig {
    /// Load a run configuration from a JSON file. Missing fields take their
    /// default values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: RunConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.replicates == 0 {
            return Err(Error::Validation("replicates must be at least 1".to_string()));
        }
        if self.max_concurrent_replicates == 0 {
            return Err(Error::Validation(
                "max_concurrent_replicates must be at least 1".to_string(),
            ));
        }
        self.simulation.validate()
    }
}
