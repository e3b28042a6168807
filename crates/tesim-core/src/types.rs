//! Core type definitions for the simulation.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Element-type tag stored in every grid cell.
///
/// `0` is reserved for an empty cell; every other value names an element
/// family. The canonical families are provided as constants but the tag set
/// itself comes from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementTag(pub u8);

impl ElementTag {
    pub const EMPTY: ElementTag = ElementTag(0);
    pub const EXON: ElementTag = ElementTag(1);
    pub const RETROTRANSPOSON: ElementTag = ElementTag(2);
    pub const DNA_TRANSPOSON: ElementTag = ElementTag(3);
    pub const NON_CODING: ElementTag = ElementTag(4);

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

impl fmt::Display for ElementTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of one element instance: a contiguous run on a single strand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub strand: usize,
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn new(strand: usize, start: usize, len: usize) -> Self {
        Self { strand, start, len }
    }

    /// One past the last column covered by this span
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.strand == other.strand && self.start < other.end() && other.start < self.end()
    }
}

/// Direction-significant interaction key: `mover` encountered `other`.
///
/// Serialized as its `"(m, t)"` text so it can key JSON maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InteractionPair {
    pub mover: ElementTag,
    pub other: ElementTag,
}

impl InteractionPair {
    pub fn new(mover: ElementTag, other: ElementTag) -> Self {
        Self { mover, other }
    }

    /// Every `(mobile, any)` combination, ordered by mover then by other.
    pub fn tracked(mobile: &[ElementTag], all: &[ElementTag]) -> Vec<InteractionPair> {
        let mut pairs: Vec<InteractionPair> = mobile
            .iter()
            .flat_map(|&mover| all.iter().map(move |&other| InteractionPair::new(mover, other)))
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }
}

impl fmt::Display for InteractionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.mover, self.other)
    }
}

impl FromStr for InteractionPair {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let inner = s
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| format!("interaction pair '{}' must look like (m, t)", s))?;
        let (mover, other) = inner
            .split_once(',')
            .ok_or_else(|| format!("interaction pair '{}' needs two tags", s))?;
        let tag = |text: &str| {
            text.trim()
                .parse::<u8>()
                .map(ElementTag)
                .map_err(|e| format!("interaction pair '{}': {}", s, e))
        };
        Ok(InteractionPair::new(tag(mover)?, tag(other)?))
    }
}

impl Serialize for InteractionPair {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InteractionPair {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// States of one simulation round, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundPhase {
    ResetGrid,
    Populate,
    ShuffleMoveOrder,
    MoveEachType,
    RoundComplete,
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoundPhase::ResetGrid => "reset-grid",
            RoundPhase::Populate => "populate",
            RoundPhase::ShuffleMoveOrder => "shuffle-move-order",
            RoundPhase::MoveEachType => "move-each-type",
            RoundPhase::RoundComplete => "round-complete",
        };
        f.write_str(name)
    }
}

/// Per-family ordered length sequences consumed by one placement pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthCatalogue {
    families: BTreeMap<ElementTag, Vec<usize>>,
}

impl LengthCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the lengths for a family, returning the builder for chaining.
    pub fn with(mut self, tag: ElementTag, lengths: Vec<usize>) -> Self {
        self.insert(tag, lengths);
        self
    }

    pub fn insert(&mut self, tag: ElementTag, lengths: Vec<usize>) {
        self.families.insert(tag, lengths);
    }

    pub fn lengths(&self, tag: ElementTag) -> Option<&[usize]> {
        self.families.get(&tag).map(Vec::as_slice)
    }

    pub fn tags(&self) -> impl Iterator<Item = ElementTag> + '_ {
        self.families.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ElementTag, &[usize])> + '_ {
        self.families.iter().map(|(tag, lengths)| (*tag, lengths.as_slice()))
    }

    pub fn total_length(&self) -> usize {
        self.families.values().flatten().sum()
    }

    pub fn total_elements(&self) -> usize {
        self.families.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_elements() == 0
    }
}
