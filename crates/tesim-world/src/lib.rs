//! Genome grid simulation engine.
//!
//! Elements are scattered onto a two-stranded grid, mobile families are
//! relocated once per round, and every landing on a foreign element is
//! tallied in the interaction log.

pub mod grid;
pub mod movement;
pub mod placement;
pub mod replicate;
pub mod simulation;
pub mod transposition;

pub use grid::Grid;
pub use movement::{policy_for, MoveKind, MovementPolicy};
pub use placement::{Placer, PlacementReport};
pub use replicate::{derive_seeds, pair_totals, InteractionRecord, ReplicateJob, ReplicateResult};
pub use simulation::{RoundSummary, Simulation, SimulationResult};
pub use transposition::{RelocationStats, Transposer};
