use super::{detail_total, RollupRow, TOTAL_ROW_TITLE};
use crate::types::{lenient_number, lenient_text, CellValue};
use serde::{Deserialize, Serialize};

/// Dimensional decomposition row of a line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailLine {
    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,

    #[serde(default, deserialize_with = "lenient_number")]
    pub number: f64,

    #[serde(default, deserialize_with = "lenient_number")]
    pub length: f64,

    #[serde(default, deserialize_with = "lenient_number")]
    pub width: f64,

    #[serde(default, deserialize_with = "lenient_number")]
    pub height: f64,

    #[serde(default, deserialize_with = "lenient_number")]
    pub factor: f64,

    /// Always the product of the five dimensions
    #[serde(default, deserialize_with = "lenient_number")]
    pub total: f64,

    #[serde(default, deserialize_with = "lenient_text")]
    pub comments: String,
}

impl DetailLine {
    /// A blank row whose neutral factor is 1.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            number: 0.0,
            length: 0.0,
            width: 0.0,
            height: 0.0,
            factor: 1.0,
            total: 0.0,
            comments: String::new(),
        }
    }

    pub fn get(&self, column: DetailColumn) -> CellValue {
        match column {
            DetailColumn::Title => CellValue::Text(self.title.clone()),
            DetailColumn::Number => CellValue::Number(self.number),
            DetailColumn::Length => CellValue::Number(self.length),
            DetailColumn::Width => CellValue::Number(self.width),
            DetailColumn::Height => CellValue::Number(self.height),
            DetailColumn::Factor => CellValue::Number(self.factor),
            DetailColumn::Total => CellValue::Number(self.total),
            DetailColumn::Comments => CellValue::Text(self.comments.clone()),
        }
    }

    /// Write one column. The total is derived and refuses writes.
    pub fn set(&mut self, column: DetailColumn, value: &CellValue) -> bool {
        match column {
            DetailColumn::Title => self.title = value.as_text(),
            DetailColumn::Number => self.number = value.as_number(),
            DetailColumn::Length => self.length = value.as_number(),
            DetailColumn::Width => self.width = value.as_number(),
            DetailColumn::Height => self.height = value.as_number(),
            DetailColumn::Factor => self.factor = value.as_number(),
            DetailColumn::Total => return false,
            DetailColumn::Comments => self.comments = value.as_text(),
        }
        self.recompute();
        true
    }
}

impl RollupRow for DetailLine {
    fn recompute(&mut self) -> f64 {
        self.total = detail_total(self.number, self.length, self.width, self.height, self.factor);
        self.total
    }

    fn total_row(total: f64) -> Self {
        Self {
            factor: 0.0,
            total,
            ..Self::new(TOTAL_ROW_TITLE)
        }
    }
}

/// Columns of a detail grid, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetailColumn {
    Title,
    Number,
    Length,
    Width,
    Height,
    Factor,
    Total,
    Comments,
}

impl DetailColumn {
    pub const ALL: [DetailColumn; 8] = [
        DetailColumn::Title,
        DetailColumn::Number,
        DetailColumn::Length,
        DetailColumn::Width,
        DetailColumn::Height,
        DetailColumn::Factor,
        DetailColumn::Total,
        DetailColumn::Comments,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::DetailTable;

    #[test]
    fn detail_table_total_tracks_rows() {
        let mut wall = DetailLine::new("Mur nord");
        wall.set(DetailColumn::Number, &CellValue::Number(2.0));
        wall.set(DetailColumn::Length, &CellValue::Number(5.0));
        wall.set(DetailColumn::Width, &CellValue::Number(0.2));
        wall.set(DetailColumn::Height, &CellValue::from("3"));
        assert!((wall.total - 6.0).abs() < 1e-9);

        let mut table = DetailTable::from_rows(vec![wall.clone(), wall]);
        assert!((table.total() - 12.0).abs() < 1e-9);

        table.update(0, |row| row.set(DetailColumn::Factor, &CellValue::from("oops")));
        assert!((table.total() - 6.0).abs() < 1e-9);

        let rows = table.rows_with_total();
        assert_eq!(rows.last().map(|r| r.title.as_str()), Some(TOTAL_ROW_TITLE));
    }
}
