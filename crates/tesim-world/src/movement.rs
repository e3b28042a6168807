//! Movement policies deciding what each mobile instance does in a round.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tesim_core::{MoveMode, MovementConfig};

/// Outcome of a policy decision for one instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveKind {
    /// Stay in place
    Stay,
    /// Clear the original span and write the target
    Cut,
    /// Write the target and keep the original
    Copy,
    /// Clear the original span without relocating
    Excise,
}

/// Strategy selecting the move for each instance. The relocation mechanics
/// (target draw, growth, interaction check, overwrite) are the same for every
/// policy.
pub trait MovementPolicy: Send + Sync {
    fn decide(&self, rng: &mut ChaCha8Rng) -> MoveKind;

    fn name(&self) -> &'static str;
}

/// Every instance is cut and pasted; draws no randomness
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconditional;

impl MovementPolicy for Unconditional {
    fn decide(&self, _rng: &mut ChaCha8Rng) -> MoveKind {
        MoveKind::Cut
    }

    fn name(&self) -> &'static str {
        "unconditional"
    }
}

/// Probability-gated movement with optional loss of the element
#[derive(Debug, Clone, Copy)]
pub struct Stochastic {
    pub move_probability: f64,
    pub mode: MoveMode,
    pub excision_probability: f64,
}

impl MovementPolicy for Stochastic {
    fn decide(&self, rng: &mut ChaCha8Rng) -> MoveKind {
        if self.excision_probability > 0.0 && rng.gen_bool(self.excision_probability) {
            return MoveKind::Excise;
        }
        if !rng.gen_bool(self.move_probability) {
            return MoveKind::Stay;
        }
        match self.mode {
            MoveMode::Cut => MoveKind::Cut,
            MoveMode::Copy => MoveKind::Copy,
        }
    }

    fn name(&self) -> &'static str {
        "stochastic"
    }
}

/// Build the policy described by `config`
pub fn policy_for(config: &MovementConfig) -> Box<dyn MovementPolicy> {
    match *config {
        MovementConfig::Unconditional => Box::new(Unconditional),
        MovementConfig::Stochastic {
            move_probability,
            mode,
            excision_probability,
        } => Box::new(Stochastic {
            move_probability,
            mode,
            excision_probability,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_unconditional_always_cuts() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let policy = policy_for(&MovementConfig::Unconditional);
        assert_eq!(policy.name(), "unconditional");
        assert!((0..100).all(|_| policy.decide(&mut rng) == MoveKind::Cut));
    }

    #[test]
    fn test_stochastic_extremes() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let never = Stochastic {
            move_probability: 0.0,
            mode: MoveMode::Cut,
            excision_probability: 0.0,
        };
        assert!((0..100).all(|_| never.decide(&mut rng) == MoveKind::Stay));

        let copy = Stochastic {
            move_probability: 1.0,
            mode: MoveMode::Copy,
            excision_probability: 0.0,
        };
        assert!((0..100).all(|_| copy.decide(&mut rng) == MoveKind::Copy));

        let lost = Stochastic {
            move_probability: 1.0,
            mode: MoveMode::Cut,
            excision_probability: 1.0,
        };
        assert!((0..100).all(|_| lost.decide(&mut rng) == MoveKind::Excise));
    }

    #[test]
    fn test_stochastic_rate_is_roughly_respected() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let policy = Stochastic {
            move_probability: 0.5,
            mode: MoveMode::Cut,
            excision_probability: 0.0,
        };

        let moved = (0..10_000)
            .filter(|_| policy.decide(&mut rng) == MoveKind::Cut)
            .count();
        assert!((4_500..5_500).contains(&moved), "moved {}", moved);
    }
}
