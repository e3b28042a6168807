//! Length provider: draws per-family element lengths.

use crate::config::{FamilyConfig, LengthDistribution};
use crate::error::{Error, Result};
use crate::types::LengthCatalogue;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

/// Attempts allowed when a uniform draw must fit under `max_total`
const MAX_TOTAL_ATTEMPTS: usize = 1000;

/// Rejection draws allowed per truncated-normal length
const MAX_TRUNCATION_ATTEMPTS: usize = 100_000;

/// Produces an ordered sequence of element lengths for one family.
pub trait LengthProvider {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<usize>>;
}

impl LengthProvider for LengthDistribution {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<usize>> {
        match self {
            LengthDistribution::Fixed { lengths } => Ok(lengths.clone()),

            LengthDistribution::TruncatedNormal {
                mean,
                min,
                max,
                std_dev,
                count,
            } => {
                if min == max {
                    return Ok(vec![round_length(*min); *count]);
                }
                let normal = Normal::new(*mean, *std_dev)
                    .map_err(|e| Error::Validation(format!("normal distribution: {}", e)))?;
                (0..*count)
                    .map(|_| {
                        (0..MAX_TRUNCATION_ATTEMPTS)
                            .map(|_| normal.sample(rng))
                            .find(|x| x >= min && x <= max)
                            .map(round_length)
                            .ok_or_else(|| {
                                Error::Validation(format!(
                                    "normal({}, {}) never fell in [{}, {}] after {} draws",
                                    mean, std_dev, min, max, MAX_TRUNCATION_ATTEMPTS
                                ))
                            })
                    })
                    .collect()
            }

            LengthDistribution::Uniform {
                low,
                high,
                count,
                max_total,
            } => {
                let draw = |rng: &mut R| -> Vec<usize> {
                    (0..*count)
                        .map(|_| {
                            if low == high {
                                round_length(*low)
                            } else {
                                round_length(rng.gen_range(*low..=*high))
                            }
                        })
                        .collect()
                };

                let Some(limit) = max_total else {
                    return Ok(draw(rng));
                };

                for attempt in 0..MAX_TOTAL_ATTEMPTS {
                    let lengths = draw(rng);
                    if lengths.iter().sum::<usize>() <= *limit {
                        if attempt > 0 {
                            debug!(attempt, limit, "Uniform lengths fit after redraw");
                        }
                        return Ok(lengths);
                    }
                }

                Err(Error::Validation(format!(
                    "{} uniform lengths in [{}, {}] never summed below {} after {} attempts",
                    count, low, high, limit, MAX_TOTAL_ATTEMPTS
                )))
            }
        }
    }
}

fn round_length(x: f64) -> usize {
    // Negative draws round to 0 and are rejected by placement.
    x.round().max(0.0) as usize
}

/// Draw the catalogue for every family, in configuration order.
pub fn build_catalogue<R: Rng + ?Sized>(families: &[FamilyConfig], rng: &mut R) -> Result<LengthCatalogue> {
    let mut catalogue = LengthCatalogue::new();
    for family in families {
        let lengths = family.lengths.sample(rng)?;
        debug!(
            family = %family.name,
            tag = %family.tag,
            count = lengths.len(),
            total = lengths.iter().sum::<usize>(),
            "Sampled family lengths"
        );
        catalogue.insert(family.tag, lengths);
    }
    Ok(catalogue)
}
