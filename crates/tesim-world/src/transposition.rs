//! Relocation of mobile elements and interaction tallying.

use crate::grid::Grid;
use crate::movement::{MoveKind, MovementPolicy};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tesim_core::{
    ElementTag, Error, InteractionLog, InteractionPair, InteractionRule, Result, Span,
};
use tracing::{debug, trace};

/// Destination of a relocation: strand and start column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub strand: usize,
    pub start: usize,
}

impl Target {
    pub fn new(strand: usize, start: usize) -> Self {
        Self { strand, start }
    }
}

/// One instance moving from `from` to `to`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub tag: ElementTag,
    pub from: Span,
    pub to: Target,
    pub kind: MoveKind,
}

/// Result of a single move
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    /// Columns added to the grid to fit the target
    pub grew_by: usize,
    /// Interactions recorded in the log
    pub interactions: u64,
}

/// Totals for one `relocate` call or, merged, for a whole round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationStats {
    pub visited: usize,
    pub moved: usize,
    pub copied: usize,
    pub excised: usize,
    pub stayed: usize,
    pub grew_by: usize,
    pub interactions: u64,
}

impl RelocationStats {
    pub fn merge(&mut self, other: &RelocationStats) {
        self.visited += other.visited;
        self.moved += other.moved;
        self.copied += other.copied;
        self.excised += other.excised;
        self.stayed += other.stayed;
        self.grew_by += other.grew_by;
        self.interactions += other.interactions;
    }
}

/// Cells written by movers during the current `relocate` call. A later
/// instance clearing its original span must not erase them.
struct Landed {
    width: usize,
    cells: Vec<bool>,
}

impl Landed {
    fn new(grid: &Grid) -> Self {
        Self {
            width: grid.width(),
            cells: vec![false; grid.strands() * grid.width()],
        }
    }

    fn widen(&mut self, width: usize) {
        if width <= self.width {
            return;
        }
        let strands = self.cells.len() / self.width.max(1);
        let mut cells = Vec::with_capacity(strands * width);
        for row in self.cells.chunks(self.width.max(1)) {
            cells.extend_from_slice(row);
            cells.resize(cells.len() + width - row.len(), false);
        }
        self.width = width;
        self.cells = cells;
    }

    fn mark(&mut self, span: Span) {
        let start = span.strand * self.width + span.start;
        self.cells[start..start + span.len].fill(true);
    }

    fn contains(&self, strand: usize, column: usize) -> bool {
        self.cells[strand * self.width + column]
    }
}

/// Moves every instance of one tag per call and records what it lands on
pub struct Transposer {
    rule: InteractionRule,
}

impl Transposer {
    pub fn new(rule: InteractionRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> InteractionRule {
        self.rule
    }

    /// Instances of `tag` currently on the grid: maximal runs split into
    /// chunks of `element_length`, the last chunk possibly shorter.
    pub fn instances(grid: &Grid, tag: ElementTag, element_length: usize) -> Result<Vec<Span>> {
        if element_length == 0 {
            return Err(Error::Validation(format!(
                "element length for tag {} must be positive",
                tag
            )));
        }

        let mut instances = Vec::new();
        for run in grid.runs(tag) {
            let mut start = run.start;
            while start < run.end() {
                let len = element_length.min(run.end() - start);
                instances.push(Span::new(run.strand, start, len));
                start += len;
            }
        }
        Ok(instances)
    }

    /// Relocate every instance of `tag` once. Instances are taken from the
    /// grid as it is when the call starts; each one draws a uniform target
    /// strand and start column, growing the grid when the target overflows.
    #[allow(clippy::too_many_arguments)]
    pub fn relocate(
        &self,
        grid: &mut Grid,
        tag: ElementTag,
        element_length: usize,
        policy: &dyn MovementPolicy,
        log: &mut InteractionLog,
        round: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<RelocationStats> {
        let instances = Self::instances(grid, tag, element_length)?;
        let mut landed = Landed::new(grid);
        let mut stats = RelocationStats::default();

        for from in instances {
            stats.visited += 1;

            let kind = policy.decide(rng);
            match kind {
                MoveKind::Stay => {
                    stats.stayed += 1;
                    continue;
                }
                MoveKind::Excise => {
                    clear_owned(grid, tag, from, Some(&landed));
                    stats.excised += 1;
                    continue;
                }
                MoveKind::Cut => stats.moved += 1,
                MoveKind::Copy => stats.copied += 1,
            }

            let to = Target::new(
                rng.gen_range(0..grid.strands()),
                rng.gen_range(0..grid.width()),
            );
            let outcome = self.apply(grid, Move { tag, from, to, kind }, log, round, Some(&mut landed))?;
            stats.grew_by += outcome.grew_by;
            stats.interactions += outcome.interactions;
        }

        debug!(
            tag = %tag,
            round,
            policy = policy.name(),
            visited = stats.visited,
            moved = stats.moved,
            copied = stats.copied,
            excised = stats.excised,
            grew_by = stats.grew_by,
            interactions = stats.interactions,
            width = grid.width(),
            "Relocated element type"
        );

        Ok(stats)
    }

    /// Perform one move to a chosen target
    pub fn move_instance(
        &self,
        grid: &mut Grid,
        mv: Move,
        log: &mut InteractionLog,
        round: usize,
    ) -> Result<MoveOutcome> {
        self.apply(grid, mv, log, round, None)
    }

    fn apply(
        &self,
        grid: &mut Grid,
        mv: Move,
        log: &mut InteractionLog,
        round: usize,
        mut landed: Option<&mut Landed>,
    ) -> Result<MoveOutcome> {
        if matches!(mv.kind, MoveKind::Stay | MoveKind::Excise) {
            return Err(Error::InvalidState(format!("{:?} is not a relocation", mv.kind)));
        }
        if mv.to.strand >= grid.strands() {
            return Err(Error::InvalidState(format!(
                "target strand {} outside grid with {} strands",
                mv.to.strand,
                grid.strands()
            )));
        }

        let mut outcome = MoveOutcome::default();
        let target = Span::new(mv.to.strand, mv.to.start, mv.from.len);

        if target.end() > grid.width() {
            let additional = target.end() - grid.width();
            *grid = grid.grow(additional);
            if let Some(landed) = landed.as_deref_mut() {
                landed.widen(grid.width());
            }
            trace!(tag = %mv.tag, additional, width = grid.width(), "Grid grown for relocation");
            outcome.grew_by = additional;
        }

        for other in self.encounters(grid, mv.tag, target) {
            log.record(round, InteractionPair::new(mv.tag, other))?;
            outcome.interactions += 1;
        }

        if mv.kind == MoveKind::Cut {
            clear_owned(grid, mv.tag, mv.from, landed.as_deref());
        }

        grid.fill(target, mv.tag);
        if let Some(landed) = landed {
            landed.mark(target);
        }

        Ok(outcome)
    }

    /// Foreign tags a mover of `tag` meets at `target`, one entry per
    /// encounter, before the target is overwritten.
    pub fn encounters(&self, grid: &Grid, tag: ElementTag, target: Span) -> Vec<ElementTag> {
        let foreign = |cell: ElementTag| !cell.is_empty() && cell != tag;

        match self.rule {
            InteractionRule::Covered => {
                let cells = grid.cells(target.strand, target.start..target.end());
                let mut found = Vec::new();
                let mut previous = ElementTag::EMPTY;
                for &cell in cells {
                    if foreign(cell) && cell != previous {
                        found.push(cell);
                    }
                    previous = cell;
                }
                found
            }
            InteractionRule::Flanking => {
                let mut flanks = Vec::with_capacity(2);
                if target.start > 0 {
                    flanks.push(target.start - 1);
                }
                if target.end() < grid.width() {
                    flanks.push(target.end());
                }
                flanks
                    .into_iter()
                    .map(|column| grid.get(target.strand, column))
                    .filter(|&cell| foreign(cell))
                    .collect()
            }
        }
    }
}

/// Empty the cells of `span` that still hold `tag` and were not written by
/// a mover earlier in the same call.
fn clear_owned(grid: &mut Grid, tag: ElementTag, span: Span, landed: Option<&Landed>) {
    for column in span.start..span.end() {
        let protected = landed.map_or(false, |l| l.contains(span.strand, column));
        if !protected && grid.get(span.strand, column) == tag {
            grid.set(span.strand, column, ElementTag::EMPTY);
        }
    }
}
