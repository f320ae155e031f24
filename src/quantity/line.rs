use super::{line_total, RollupRow, TOTAL_ROW_TITLE};
use crate::types::{lenient_number, lenient_text, CellValue, LineId};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// A priced line item of a chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainTableLine {
    /// Stable identifier; detail tables are keyed by it
    #[serde(default = "new_line_id", deserialize_with = "lenient_id")]
    pub id: LineId,

    #[serde(default, deserialize_with = "lenient_text")]
    pub gr: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub num: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub nm: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub unit: String,

    #[serde(default, deserialize_with = "lenient_number")]
    pub quantity: f64,

    #[serde(default, deserialize_with = "lenient_number")]
    pub unit_price: f64,

    /// Always `quantity * unit_price`
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_price: f64,

    #[serde(default, deserialize_with = "lenient_text")]
    pub comments: String,
}

impl MainTableLine {
    /// Create an empty line with a fresh id
    pub fn new() -> Self {
        Self {
            id: new_line_id(),
            gr: String::new(),
            num: String::new(),
            title: String::new(),
            nm: String::new(),
            unit: String::new(),
            quantity: 0.0,
            unit_price: 0.0,
            total_price: 0.0,
            comments: String::new(),
        }
    }

    /// Read one column.
    pub fn get(&self, column: LineColumn) -> CellValue {
        match column {
            LineColumn::Gr => CellValue::Text(self.gr.clone()),
            LineColumn::Num => CellValue::Text(self.num.clone()),
            LineColumn::Title => CellValue::Text(self.title.clone()),
            LineColumn::Nm => CellValue::Text(self.nm.clone()),
            LineColumn::Unit => CellValue::Text(self.unit.clone()),
            LineColumn::Quantity => CellValue::Number(self.quantity),
            LineColumn::UnitPrice => CellValue::Number(self.unit_price),
            LineColumn::TotalPrice => CellValue::Number(self.total_price),
            LineColumn::Comments => CellValue::Text(self.comments.clone()),
        }
    }

    /// Write one column. The price column is derived and refuses writes.
    pub fn set(&mut self, column: LineColumn, value: &CellValue) -> bool {
        match column {
            LineColumn::Gr => self.gr = value.as_text(),
            LineColumn::Num => self.num = value.as_text(),
            LineColumn::Title => self.title = value.as_text(),
            LineColumn::Nm => self.nm = value.as_text(),
            LineColumn::Unit => self.unit = value.as_text(),
            LineColumn::Quantity => self.quantity = value.as_number(),
            LineColumn::UnitPrice => self.unit_price = value.as_number(),
            LineColumn::TotalPrice => return false,
            LineColumn::Comments => self.comments = value.as_text(),
        }
        self.recompute();
        true
    }
}

impl Default for MainTableLine {
    fn default() -> Self {
        Self::new()
    }
}

impl RollupRow for MainTableLine {
    fn recompute(&mut self) -> f64 {
        self.total_price = line_total(self.quantity, self.unit_price);
        self.total_price
    }

    fn total_row(total: f64) -> Self {
        Self {
            id: String::new(),
            title: TOTAL_ROW_TITLE.to_string(),
            total_price: total,
            ..Self::new()
        }
    }
}

/// Columns of a line item grid, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineColumn {
    Gr,
    Num,
    Title,
    Nm,
    Unit,
    Quantity,
    UnitPrice,
    TotalPrice,
    Comments,
}

impl LineColumn {
    pub const ALL: [LineColumn; 9] = [
        LineColumn::Gr,
        LineColumn::Num,
        LineColumn::Title,
        LineColumn::Nm,
        LineColumn::Unit,
        LineColumn::Quantity,
        LineColumn::UnitPrice,
        LineColumn::TotalPrice,
        LineColumn::Comments,
    ];

    /// Position of the column in a grid row
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Grid header label
    pub fn header(self) -> &'static str {
        match self {
            LineColumn::Gr => "Gr",
            LineColumn::Num => "Num",
            LineColumn::Title => "Intitulé",
            LineColumn::Nm => "Nm",
            LineColumn::Unit => "Unité",
            LineColumn::Quantity => "Quantité",
            LineColumn::UnitPrice => "PU",
            LineColumn::TotalPrice => "Prix",
            LineColumn::Comments => "Commentaires",
        }
    }

    /// Whether the column feeds the price computation
    pub fn affects_price(self) -> bool {
        matches!(self, LineColumn::Quantity | LineColumn::UnitPrice)
    }

    pub fn is_read_only(self) -> bool {
        self == LineColumn::TotalPrice
    }
}

pub(crate) fn new_line_id() -> LineId {
    Uuid::new_v4().to_string()
}

/// Server ids arrive as numbers; a missing or empty id gets a fresh one.
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<LineId, D::Error>
where
    D: Deserializer<'de>,
{
    let id = lenient_text(deserializer)?;
    Ok(if id.is_empty() { new_line_id() } else { id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_column_is_read_only() {
        let mut line = MainTableLine::new();
        line.set(LineColumn::Quantity, &CellValue::from("10"));
        line.set(LineColumn::UnitPrice, &CellValue::Number(150.0));
        assert_eq!(line.total_price, 1500.0);

        assert!(!line.set(LineColumn::TotalPrice, &CellValue::Number(1.0)));
        assert_eq!(line.total_price, 1500.0);
    }

    #[test]
    fn column_schema_round_trips_indices() {
        for column in LineColumn::ALL {
            assert_eq!(LineColumn::from_index(column.index()), Some(column));
        }
        assert_eq!(LineColumn::TotalPrice.index(), 7);
        assert_eq!(LineColumn::from_index(9), None);
    }

    #[test]
    fn numeric_server_id_becomes_text() {
        let line: MainTableLine = serde_json::from_str(r#"{"id": 42, "title": "Mur"}"#).unwrap();
        assert_eq!(line.id, "42");

        let fresh: MainTableLine = serde_json::from_str(r#"{"id": null}"#).unwrap();
        assert!(!fresh.id.is_empty());
    }
}
