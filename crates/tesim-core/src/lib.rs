//! Core types and utilities for the transposable-element collision simulator.

pub mod types;
pub mod config;
pub mod error;
pub mod interaction;
pub mod lengths;

pub use error::{Error, Result};
pub use types::*;
pub use config::*;
pub use interaction::InteractionLog;
pub use lengths::{build_catalogue, LengthProvider};
