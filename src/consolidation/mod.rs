//! Consolidation engine
//!
//! Flattens every chapter of a version into one summary grid: a header row
//! per chapter, its line rows, a blank separator, and a final project total.
//! Edits made in the grid are mapped back to the chapter tables through
//! [`Consolidation::line_ref`].

use crate::quantity::{ChapterTable, LineColumn, MainTableLine};
use crate::tree::{compare_nums, ChapterTree};
use crate::types::{finite_or_zero, CellValue, ChapterKey};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Title of the last row
pub const PROJECT_TOTAL_TITLE: &str = "TOTAL PROJET";

/// Number of grid columns
pub const COLUMN_COUNT: usize = LineColumn::ALL.len();

/// A row of the summary grid
#[derive(Debug, Clone, PartialEq)]
pub enum ConsolidatedRow {
    /// `"<num> - <label>"` spanning the whole row
    ChapterHeader { chapter_id: ChapterKey, title: String },

    /// A line of a chapter table
    Line {
        chapter_id: ChapterKey,
        line_index: usize,
        line: MainTableLine,
    },

    /// Blank row closing a chapter
    Separator,

    /// Sum of every line price
    ProjectTotal { total: f64 },
}

impl ConsolidatedRow {
    /// Cell value at `column` as a grid would show it
    pub fn cell(&self, column: LineColumn) -> CellValue {
        match self {
            ConsolidatedRow::ChapterHeader { title, .. } if column.index() == 0 => CellValue::from(title.as_str()),
            ConsolidatedRow::Line { line, .. } => line.get(column),
            ConsolidatedRow::ProjectTotal { .. } if column.index() == 0 => CellValue::from(PROJECT_TOTAL_TITLE),
            ConsolidatedRow::ProjectTotal { total } if column == LineColumn::TotalPrice => CellValue::Number(*total),
            _ => CellValue::Empty,
        }
    }
}

/// Cells merged into one when rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSpan {
    pub row: usize,
    pub col: usize,
    pub rowspan: usize,
    pub colspan: usize,
}

/// Where a summary line row comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRef {
    pub chapter_id: ChapterKey,
    pub line_index: usize,
}

/// Result of a summary edit
#[derive(Debug, Clone, PartialEq)]
pub enum EditOutcome {
    /// Source table and summary were updated
    Applied { grand_total: f64 },

    /// The cell is not editable
    Rejected(&'static str),

    /// The row's chapter no longer exists; nothing changed
    Ignored,
}

/// The flattened summary of one version
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Consolidation {
    rows: Vec<ConsolidatedRow>,
    row_index: BTreeMap<usize, LineRef>,
    merge_spans: Vec<MergeSpan>,
    grand_total: f64,
}

impl Consolidation {
    /// Build the summary of every chapter of `tree`, ordered by number.
    pub fn flatten(tree: &ChapterTree, tables: &BTreeMap<ChapterKey, ChapterTable>) -> Self {
        let mut chapters = tree.flatten();
        chapters.sort_by(|a, b| compare_nums(&a.num, &b.num));

        let mut summary = Self::default();
        for chapter in chapters {
            summary.merge_spans.push(MergeSpan {
                row: summary.rows.len(),
                col: 0,
                rowspan: 1,
                colspan: COLUMN_COUNT,
            });
            summary.rows.push(ConsolidatedRow::ChapterHeader {
                chapter_id: chapter.key.clone(),
                title: format!("{} - {}", chapter.num, chapter.label),
            });

            if let Some(table) = tables.get(&chapter.key) {
                for (line_index, line) in table.rows().iter().enumerate() {
                    summary.row_index.insert(
                        summary.rows.len(),
                        LineRef {
                            chapter_id: chapter.key.clone(),
                            line_index,
                        },
                    );
                    summary.grand_total += finite_or_zero(line.total_price);
                    summary.rows.push(ConsolidatedRow::Line {
                        chapter_id: chapter.key.clone(),
                        line_index,
                        line: line.clone(),
                    });
                }
            }

            summary.rows.push(ConsolidatedRow::Separator);
        }

        summary.merge_spans.push(MergeSpan {
            row: summary.rows.len(),
            col: 0,
            rowspan: 1,
            colspan: LineColumn::TotalPrice.index(),
        });
        summary.rows.push(ConsolidatedRow::ProjectTotal {
            total: summary.grand_total,
        });

        debug!(rows = summary.rows.len(), total = summary.grand_total, "summary flattened");
        summary
    }

    pub fn rows(&self) -> &[ConsolidatedRow] {
        &self.rows
    }

    pub fn merge_spans(&self) -> &[MergeSpan] {
        &self.merge_spans
    }

    pub fn grand_total(&self) -> f64 {
        self.grand_total
    }

    /// Source of the line shown at `row`
    pub fn line_ref(&self, row: usize) -> Option<&LineRef> {
        self.row_index.get(&row)
    }

    /// Apply a grid edit to the chapter tables and to this summary.
    pub fn apply_edit(
        &mut self,
        tables: &mut BTreeMap<ChapterKey, ChapterTable>,
        row: usize,
        column: LineColumn,
        value: &CellValue,
    ) -> EditOutcome {
        let Some(target) = self.row_index.get(&row).cloned() else {
            let reason = match self.rows.get(row) {
                Some(ConsolidatedRow::ChapterHeader { .. }) => "chapter header rows are read-only",
                Some(ConsolidatedRow::Separator) => "separator rows are read-only",
                Some(ConsolidatedRow::ProjectTotal { .. }) => "the project total is read-only",
                _ => "no such row",
            };
            warn!(row, reason, "summary edit rejected");
            return EditOutcome::Rejected(reason);
        };
        if column.is_read_only() {
            warn!(row, "summary edit rejected: price is computed");
            return EditOutcome::Rejected("the price column is computed");
        }

        let Some(table) = tables.get_mut(&target.chapter_id) else {
            debug!(chapter = %target.chapter_id, "summary edit for a missing chapter ignored");
            return EditOutcome::Ignored;
        };
        let Some(updated) = table.update(target.line_index, |line| {
            line.set(column, value);
            line.clone()
        }) else {
            return EditOutcome::Ignored;
        };

        if let Some(ConsolidatedRow::Line { line, .. }) = self.rows.get_mut(row) {
            *line = updated;
        }
        self.recompute_total();
        EditOutcome::Applied {
            grand_total: self.grand_total,
        }
    }

    fn recompute_total(&mut self) {
        self.grand_total = self
            .rows
            .iter()
            .filter_map(|row| match row {
                ConsolidatedRow::Line { line, .. } => Some(finite_or_zero(line.total_price)),
                _ => None,
            })
            .sum();
        if let Some(ConsolidatedRow::ProjectTotal { total }) = self.rows.last_mut() {
            *total = self.grand_total;
        }
    }
}
