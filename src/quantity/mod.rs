//! Quantity calculator
//!
//! Pure formulas for line and detail totals, and the [`Table`] container
//! that keeps a trailing total in step with its rows.

mod detail;
mod line;

pub use detail::{DetailColumn, DetailLine};
pub use line::{LineColumn, MainTableLine};

use crate::types::finite_or_zero;
use serde::{Deserialize, Deserializer, Serialize};

/// Title carried by the synthetic trailing row of every table.
pub const TOTAL_ROW_TITLE: &str = "Total";

/// Price of a line item. Non-finite inputs count as 0.
pub fn line_total(quantity: f64, unit_price: f64) -> f64 {
    finite_or_zero(finite_or_zero(quantity) * finite_or_zero(unit_price))
}

/// Quantity of a detail row: the product of its five dimensions.
pub fn detail_total(number: f64, length: f64, width: f64, height: f64, factor: f64) -> f64 {
    finite_or_zero(
        [number, length, width, height, factor]
            .into_iter()
            .map(finite_or_zero)
            .product::<f64>(),
    )
}

/// A row with a derived column that rolls up into a table total.
pub trait RollupRow {
    /// Recompute the derived column and return its new value.
    fn recompute(&mut self) -> f64;

    /// Build the synthetic trailing row showing `total`.
    fn total_row(total: f64) -> Self;
}

/// Recompute every row's derived column and return their sum.
///
/// Idempotent: a second call over the same rows changes nothing.
pub fn rollup_totals<R: RollupRow>(rows: &mut [R]) -> f64 {
    rows.iter_mut().map(RollupRow::recompute).sum()
}

/// Ordered rows plus the total of their derived column.
///
/// The total is never trusted from outside: it is recomputed on
/// construction, on deserialization, and after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table<R> {
    rows: Vec<R>,
    total: f64,
}

/// Line items of one chapter.
pub type ChapterTable = Table<MainTableLine>;

/// Detail rows of one line item.
pub type DetailTable = Table<DetailLine>;

impl<R: RollupRow> Default for Table<R> {
    fn default() -> Self {
        Self::from_rows(Vec::new())
    }
}

impl<R: RollupRow> Table<R> {
    /// Build a table and roll it up.
    pub fn from_rows(rows: Vec<R>) -> Self {
        let mut table = Self { rows, total: 0.0 };
        table.rollup();
        table
    }

    /// Recompute all derived cells and the total.
    pub fn rollup(&mut self) -> f64 {
        self.total = rollup_totals(&mut self.rows);
        self.total
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&R> {
        self.rows.get(index)
    }

    /// Append a row and return its index.
    pub fn push(&mut self, row: R) -> usize {
        self.rows.push(row);
        self.rollup();
        self.rows.len() - 1
    }

    /// Remove the row at `index`. Out of range is a no-op.
    pub fn remove(&mut self, index: usize) -> Option<R> {
        if index >= self.rows.len() {
            return None;
        }
        let row = self.rows.remove(index);
        self.rollup();
        Some(row)
    }

    /// Mutate the row at `index` and roll the table up again.
    pub fn update<T>(&mut self, index: usize, f: impl FnOnce(&mut R) -> T) -> Option<T> {
        let row = self.rows.get_mut(index)?;
        let out = f(row);
        self.rollup();
        Some(out)
    }

    /// Rows followed by the synthetic total row.
    pub fn rows_with_total(&self) -> Vec<R>
    where
        R: Clone,
    {
        let mut rows = self.rows.clone();
        rows.push(R::total_row(self.total));
        rows
    }
}

impl<'de, R> Deserialize<'de> for Table<R>
where
    R: Deserialize<'de> + RollupRow,
{
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Repr<R> {
            #[serde(default = "Vec::new")]
            rows: Vec<R>,
        }

        let repr = Repr::<R>::deserialize(deserializer)?;
        Ok(Table::from_rows(repr.rows))
    }
}
