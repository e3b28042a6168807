//! Two-stranded linear genome grid.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use tesim_core::{ElementTag, GridConfig, Span};

/// A strands x width array of element tags, stored strand-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    strands: usize,
    width: usize,
    cells: Vec<ElementTag>,
}

impl Grid {
    pub fn new(strands: usize, width: usize) -> Self {
        Self {
            strands,
            width,
            cells: vec![ElementTag::EMPTY; strands * width],
        }
    }

    /// Create an empty grid from configuration
    pub fn from_config(config: &GridConfig) -> Self {
        Self::new(config.strands, config.width)
    }

    pub fn strands(&self) -> usize {
        self.strands
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn get(&self, strand: usize, column: usize) -> ElementTag {
        self.cells[self.index(strand, column)]
    }

    pub fn set(&mut self, strand: usize, column: usize, tag: ElementTag) {
        let index = self.index(strand, column);
        self.cells[index] = tag;
    }

    /// All cells of one strand
    pub fn strand(&self, strand: usize) -> &[ElementTag] {
        let start = strand * self.width;
        &self.cells[start..start + self.width]
    }

    /// Cells of one strand in `columns`
    pub fn cells(&self, strand: usize, columns: Range<usize>) -> &[ElementTag] {
        &self.strand(strand)[columns]
    }

    /// Write `tag` across every cell of `span`
    pub fn fill(&mut self, span: Span, tag: ElementTag) {
        if span.len == 0 {
            return;
        }
        let start = self.index(span.strand, span.start);
        let last = self.index(span.strand, span.end() - 1);
        self.cells[start..=last].fill(tag);
    }

    /// True when `span` lies inside the grid and every cell is empty
    pub fn is_free(&self, span: Span) -> bool {
        span.strand < self.strands
            && span.end() <= self.width
            && self.cells(span.strand, span.start..span.end()).iter().all(ElementTag::is_empty)
    }

    /// Clear every cell, keeping the current width
    pub fn reset(&mut self) {
        self.cells.fill(ElementTag::EMPTY);
    }

    /// A copy widened by `additional` empty columns on the right. Existing
    /// cells keep their (strand, column) coordinates.
    pub fn grow(&self, additional: usize) -> Grid {
        let width = self.width + additional;
        let mut cells = Vec::with_capacity(self.strands * width);
        for strand in 0..self.strands {
            cells.extend_from_slice(self.strand(strand));
            cells.resize((strand + 1) * width, ElementTag::EMPTY);
        }
        Grid {
            strands: self.strands,
            width,
            cells,
        }
    }

    /// Maximal contiguous runs of `tag`, strand by strand, left to right
    pub fn runs(&self, tag: ElementTag) -> Vec<Span> {
        (0..self.strands)
            .flat_map(|strand| self.runs_on(strand, tag))
            .collect()
    }

    /// Maximal contiguous runs of `tag` on one strand, left to right
    pub fn runs_on(&self, strand: usize, tag: ElementTag) -> impl Iterator<Item = Span> + '_ {
        let row = self.strand(strand);
        let mut column = 0;
        std::iter::from_fn(move || {
            while column < row.len() && row[column] != tag {
                column += 1;
            }
            if column == row.len() {
                return None;
            }
            let start = column;
            while column < row.len() && row[column] == tag {
                column += 1;
            }
            Some(Span::new(strand, start, column - start))
        })
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.iter().filter(|tag| !tag.is_empty()).count()
    }

    pub fn count(&self, tag: ElementTag) -> usize {
        self.cells.iter().filter(|&&t| t == tag).count()
    }

    pub fn total_cells(&self) -> usize {
        self.cells.len()
    }

    /// Fraction of non-empty cells
    pub fn density(&self) -> f64 {
        if self.cells.is_empty() {
            return 0.0;
        }
        self.occupied_cells() as f64 / self.cells.len() as f64
    }

    /// One line of symbols per strand; only useful for small grids
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.strands * (self.width + 1));
        for strand in 0..self.strands {
            out.extend(self.strand(strand).iter().map(|&tag| symbol(tag)));
            out.push('\n');
        }
        out
    }

    fn index(&self, strand: usize, column: usize) -> usize {
        assert!(
            strand < self.strands && column < self.width,
            "cell ({}, {}) outside {}x{} grid",
            strand,
            column,
            self.strands,
            self.width
        );
        strand * self.width + column
    }
}

fn symbol(tag: ElementTag) -> char {
    match tag {
        ElementTag::EMPTY => ' ',
        ElementTag::EXON => '▒',
        ElementTag::RETROTRANSPOSON => '▶',
        ElementTag::DNA_TRANSPOSON => '◀',
        ElementTag::NON_CODING => '·',
        ElementTag(n) => char::from_digit(u32::from(n % 10), 10).unwrap_or('?'),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_grid_creation() {
        let grid = Grid::new(2, 10);
        assert_eq!(grid.strands(), 2);
        assert_eq!(grid.width(), 10);
        assert_eq!(grid.total_cells(), 20);
        assert_eq!(grid.occupied_cells(), 0);
        assert_eq!(grid.density(), 0.0);
    }

    #[test]
    fn test_fill_and_runs() {
        let mut grid = Grid::new(2, 10);
        grid.fill(Span::new(0, 2, 3), ElementTag(2));
        grid.fill(Span::new(1, 0, 2), ElementTag(2));
        grid.fill(Span::new(1, 5, 1), ElementTag(3));

        assert_eq!(
            grid.runs(ElementTag(2)),
            vec![Span::new(0, 2, 3), Span::new(1, 0, 2)]
        );
        assert_eq!(grid.runs(ElementTag(3)), vec![Span::new(1, 5, 1)]);
        assert_eq!(grid.count(ElementTag(2)), 5);
        assert_eq!(grid.occupied_cells(), 6);
        assert!((grid.density() - 0.3).abs() < 1e-12);
    }

    #[test]
    #[should_panic(expected = "outside 2x10 grid")]
    fn test_get_past_width_panics() {
        let grid = Grid::new(2, 10);
        grid.get(0, 12);
    }

    #[test]
    #[should_panic(expected = "outside 2x10 grid")]
    fn test_set_past_width_panics() {
        let mut grid = Grid::new(2, 10);
        grid.set(0, 10, ElementTag(1));
    }

    #[test]
    #[should_panic(expected = "outside 2x10 grid")]
    fn test_fill_past_width_panics() {
        let mut grid = Grid::new(2, 10);
        grid.fill(Span::new(0, 8, 4), ElementTag(1));
    }

    #[test]
    fn test_run_touching_right_edge() {
        let mut grid = Grid::new(1, 6);
        grid.fill(Span::new(0, 3, 3), ElementTag(4));
        assert_eq!(grid.runs(ElementTag(4)), vec![Span::new(0, 3, 3)]);
    }

    #[test]
    fn test_is_free() {
        let mut grid = Grid::new(2, 10);
        grid.set(1, 4, ElementTag(1));

        assert!(grid.is_free(Span::new(0, 0, 10)));
        assert!(!grid.is_free(Span::new(0, 5, 6)));
        assert!(!grid.is_free(Span::new(1, 3, 2)));
        assert!(grid.is_free(Span::new(1, 5, 5)));
        assert!(!grid.is_free(Span::new(2, 0, 1)));
    }

    #[test]
    fn test_reset_preserves_width() {
        let mut grid = Grid::new(2, 10).grow(4);
        grid.fill(Span::new(0, 0, 14), ElementTag(1));
        grid.reset();

        assert_eq!(grid.width(), 14);
        assert_eq!(grid.occupied_cells(), 0);
    }

    #[test]
    fn test_grow_keeps_coordinates() {
        let mut grid = Grid::new(2, 10);
        grid.fill(Span::new(0, 7, 3), ElementTag(3));
        grid.fill(Span::new(1, 0, 2), ElementTag(1));

        let grown = grid.grow(4);
        assert_eq!(grown.width(), 14);
        assert_eq!(grown.cells(0, 0..10), grid.cells(0, 0..10));
        assert_eq!(grown.cells(1, 0..10), grid.cells(1, 0..10));
        assert!(grown.cells(0, 10..14).iter().all(ElementTag::is_empty));
        assert!(grown.cells(1, 10..14).iter().all(ElementTag::is_empty));
    }

    #[test]
    fn test_render() {
        let mut grid = Grid::new(2, 4);
        grid.fill(Span::new(0, 0, 2), ElementTag::EXON);
        grid.set(1, 3, ElementTag::DNA_TRANSPOSON);
        grid.set(1, 0, ElementTag(7));

        assert_eq!(grid.render(), "▒▒  \n7  ◀\n");
    }

    proptest! {
        #[test]
        fn prop_grow_is_monotonic_and_preserving(
            strands in 1usize..4,
            width in 1usize..40,
            additional in 1usize..20,
            seed_cells in proptest::collection::vec((0usize..4, 0usize..40, 1u8..5), 0..30),
        ) {
            let mut grid = Grid::new(strands, width);
            for (strand, column, tag) in seed_cells {
                if strand < strands && column < width {
                    grid.set(strand, column, ElementTag(tag));
                }
            }

            let grown = grid.grow(additional);
            prop_assert!(grown.width() > grid.width());
            prop_assert_eq!(grown.occupied_cells(), grid.occupied_cells());
            for strand in 0..strands {
                for column in 0..width {
                    prop_assert_eq!(grown.get(strand, column), grid.get(strand, column));
                }
            }
        }
    }
}
