//! Error types for the simulation.

use crate::types::{ElementTag, InteractionPair, RoundPhase};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no free span of length {length} left for element {tag}")]
    PlacementExhausted { tag: ElementTag, length: usize },

    #[error("interaction {0} is not in the tracked pair set")]
    UnknownInteractionPair(InteractionPair),

    #[error("invalid length {length} for element {tag}: {reason}")]
    InvalidLengthCatalogue {
        tag: ElementTag,
        length: usize,
        reason: String,
    },

    #[error("round {round} is outside the log ({num_rounds} rounds)")]
    RoundOutOfRange { round: usize, num_rounds: usize },

    #[error("round {round} failed during {phase} (seed {seed}): {source}")]
    RoundFailed {
        round: usize,
        seed: u64,
        phase: RoundPhase,
        #[source]
        source: Box<Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// The innermost error, looking through round failure context.
    pub fn root(&self) -> &Error {
        match self {
            Error::RoundFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
