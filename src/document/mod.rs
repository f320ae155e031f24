//! Working state of one project version
//!
//! A [`ProjectDocument`] is the whole editable graph: the chapter tree, a
//! line table per chapter, a detail table per line and a notes blob per
//! chapter. Mutations keep every table total rolled up and cascade
//! deletions, so no line or detail outlives its owner.

use crate::quantity::{ChapterTable, DetailColumn, DetailLine, DetailTable, LineColumn, MainTableLine};
use crate::tree::ChapterTree;
use crate::types::{CellValue, ChapterKey, LineId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Separator between chapter key and line id in detail keys
pub const DETAIL_KEY_SEPARATOR: &str = "::";

/// Key of a line's detail table: `"<chapterKey>::<lineId>"`
pub fn detail_key(chapter: &str, line: &str) -> String {
    format!("{}{}{}", chapter, DETAIL_KEY_SEPARATOR, line)
}

/// Part of the document a mutation touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slice {
    Tree,
    Tables,
    Details,
    Notes,
}

impl Slice {
    pub const ALL: [Slice; 4] = [Slice::Tree, Slice::Tables, Slice::Details, Slice::Notes];
}

/// Tree, tables, details and notes of one version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDocument {
    #[serde(default)]
    pub tree_data: ChapterTree,
    #[serde(default)]
    pub table_data_map: BTreeMap<ChapterKey, ChapterTable>,
    #[serde(default)]
    pub detail_data_map: BTreeMap<String, DetailTable>,
    #[serde(default)]
    pub chapter_text_map: BTreeMap<ChapterKey, String>,
}

impl ProjectDocument {
    /// Create an empty document
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &ChapterTree {
        &self.tree_data
    }

    pub fn table(&self, chapter: &str) -> Option<&ChapterTable> {
        self.table_data_map.get(chapter)
    }

    pub fn note(&self, chapter: &str) -> &str {
        self.chapter_text_map.get(chapter).map(String::as_str).unwrap_or("")
    }

    /// Detail table of the line at `line_index` in `chapter`
    pub fn detail_table(&self, chapter: &str, line_index: usize) -> Option<&DetailTable> {
        let id = self.line_id(chapter, line_index)?;
        self.detail_data_map.get(&detail_key(chapter, &id))
    }

    fn line_id(&self, chapter: &str, line_index: usize) -> Option<LineId> {
        self.table(chapter)?.get(line_index).map(|l| l.id.clone())
    }

    /// Index of a line by its stable id
    pub fn line_index(&self, chapter: &str, id: &str) -> Option<usize> {
        self.table(chapter)?.rows().iter().position(|l| l.id == id)
    }

    /// Sum of the table totals of every chapter in the tree
    pub fn grand_total(&self) -> f64 {
        self.tree_data
            .flatten()
            .iter()
            .filter_map(|c| self.table(&c.key))
            .map(ChapterTable::total)
            .sum()
    }

    /* ------------------------------ chapters ------------------------------ */

    pub fn add_root(&mut self) -> ChapterKey {
        self.tree_data.add_root()
    }

    pub fn add_child(&mut self, parent: &str) -> Option<ChapterKey> {
        self.tree_data.add_child(parent)
    }

    pub fn update_chapter(&mut self, key: &str, num: Option<&str>, label: Option<&str>) -> bool {
        self.tree_data.update_node(key, num, label)
    }

    /// Delete a chapter subtree with its tables, detail tables and notes.
    pub fn delete_chapter(&mut self, key: &str) -> Vec<ChapterKey> {
        let removed = self.tree_data.delete_node(key);
        for chapter in &removed {
            self.table_data_map.remove(chapter);
            self.chapter_text_map.remove(chapter);
            let prefix = detail_key(chapter, "");
            self.detail_data_map.retain(|k, _| !k.starts_with(&prefix));
        }
        if !removed.is_empty() {
            debug!(chapter = %key, removed = removed.len(), "chapter subtree deleted");
        }
        removed
    }

    /* -------------------------------- lines ------------------------------- */

    /// Append a line to a chapter's table, creating the table if needed.
    ///
    /// Returns the line index, or `None` when the chapter is not in the tree.
    pub fn add_line(&mut self, chapter: &str, line: MainTableLine) -> Option<usize> {
        if !self.tree_data.contains(chapter) {
            return None;
        }
        Some(self.table_data_map.entry(chapter.to_string()).or_default().push(line))
    }

    /// Write one cell of a line. The price column is refused.
    pub fn edit_line(&mut self, chapter: &str, line_index: usize, column: LineColumn, value: &CellValue) -> bool {
        self.table_data_map
            .get_mut(chapter)
            .and_then(|table| table.update(line_index, |line| line.set(column, value)))
            .unwrap_or(false)
    }

    /// Remove a line and its detail table.
    pub fn delete_line(&mut self, chapter: &str, line_index: usize) -> Option<MainTableLine> {
        let line = self.table_data_map.get_mut(chapter)?.remove(line_index)?;
        self.detail_data_map.remove(&detail_key(chapter, &line.id));
        Some(line)
    }

    /// Copy a line's detail total into its quantity.
    pub fn apply_detail_quantity(&mut self, chapter: &str, line_index: usize) -> Option<f64> {
        let quantity = self.detail_table(chapter, line_index)?.total();
        self.edit_line(chapter, line_index, LineColumn::Quantity, &CellValue::Number(quantity))
            .then_some(quantity)
    }

    /* ------------------------------- details ------------------------------ */

    /// Append a detail row under a line, creating its table if needed.
    pub fn add_detail_row(&mut self, chapter: &str, line_index: usize, row: DetailLine) -> Option<usize> {
        let id = self.line_id(chapter, line_index)?;
        Some(self.detail_data_map.entry(detail_key(chapter, &id)).or_default().push(row))
    }

    pub fn edit_detail(
        &mut self,
        chapter: &str,
        line_index: usize,
        row_index: usize,
        column: DetailColumn,
        value: &CellValue,
    ) -> bool {
        let Some(id) = self.line_id(chapter, line_index) else {
            return false;
        };
        self.detail_data_map
            .get_mut(&detail_key(chapter, &id))
            .and_then(|table| table.update(row_index, |row| row.set(column, value)))
            .unwrap_or(false)
    }

    pub fn delete_detail_row(&mut self, chapter: &str, line_index: usize, row_index: usize) -> Option<DetailLine> {
        let id = self.line_id(chapter, line_index)?;
        self.detail_data_map.get_mut(&detail_key(chapter, &id))?.remove(row_index)
    }

    /* -------------------------------- notes ------------------------------- */

    /// Set a chapter's notes. Unknown chapters are ignored.
    pub fn set_note(&mut self, chapter: &str, text: impl Into<String>) -> bool {
        if !self.tree_data.contains(chapter) {
            return false;
        }
        self.chapter_text_map.insert(chapter.to_string(), text.into());
        true
    }

    /* ------------------------------- slices ------------------------------- */

    /// JSON text of one slice, as persisted under its key
    pub fn slice_json(&self, slice: Slice) -> serde_json::Result<String> {
        match slice {
            Slice::Tree => serde_json::to_string(&self.tree_data),
            Slice::Tables => serde_json::to_string(&self.table_data_map),
            Slice::Details => serde_json::to_string(&self.detail_data_map),
            Slice::Notes => serde_json::to_string(&self.chapter_text_map),
        }
    }

    /// Replace one slice from its JSON text. On error the slice is unchanged.
    pub fn load_slice_json(&mut self, slice: Slice, raw: &str) -> serde_json::Result<()> {
        match slice {
            Slice::Tree => self.tree_data = serde_json::from_str(raw)?,
            Slice::Tables => self.table_data_map = serde_json::from_str(raw)?,
            Slice::Details => self.detail_data_map = serde_json::from_str(raw)?,
            Slice::Notes => self.chapter_text_map = serde_json::from_str(raw)?,
        }
        Ok(())
    }

    /// Re-derive every total after loading from an untrusted source.
    pub fn rollup_all(&mut self) {
        for table in self.table_data_map.values_mut() {
            table.rollup();
        }
        for table in self.detail_data_map.values_mut() {
            table.rollup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(title: &str, quantity: f64, unit_price: f64) -> MainTableLine {
        MainTableLine {
            title: title.to_string(),
            quantity,
            unit_price,
            ..MainTableLine::new()
        }
    }

    #[test]
    fn delete_chapter_cascades() {
        let mut doc = ProjectDocument::new();
        let root = doc.add_root();
        let child = doc.add_child(&root).unwrap_or_default();
        let other = doc.add_root();

        doc.add_line(&child, line("Enduit", 2.0, 10.0));
        doc.add_detail_row(&child, 0, DetailLine::new("pan"));
        doc.set_note(&child, "notes");
        doc.add_line(&other, line("Tuiles", 1.0, 1.0));
        doc.add_detail_row(&other, 0, DetailLine::new("pan"));

        let removed = doc.delete_chapter(&root);
        assert_eq!(removed.len(), 2);
        assert!(doc.table(&child).is_none());
        assert_eq!(doc.note(&child), "");
        assert_eq!(doc.detail_data_map.len(), 1);
        assert!(doc.detail_table(&other, 0).is_some());
    }

    #[test]
    fn malformed_slice_leaves_state_alone() {
        let mut doc = ProjectDocument::new();
        let c = doc.add_root();
        doc.set_note(&c, "keep");

        assert!(doc.load_slice_json(Slice::Notes, "{oops").is_err());
        assert_eq!(doc.note(&c), "keep");

        let raw = doc.slice_json(Slice::Tree).unwrap();
        let mut other = ProjectDocument::new();
        other.load_slice_json(Slice::Tree, &raw).unwrap();
        assert!(other.tree().contains(&c));
    }

    #[test]
    fn delete_line_drops_its_details() {
        let mut doc = ProjectDocument::new();
        let c = doc.add_root();
        doc.add_line(&c, line("A", 1.0, 1.0));
        doc.add_line(&c, line("B", 1.0, 2.0));
        doc.add_detail_row(&c, 0, DetailLine::new("x"));
        doc.add_detail_row(&c, 1, DetailLine::new("y"));

        let removed = doc.delete_line(&c, 0).map(|l| l.title);
        assert_eq!(removed.as_deref(), Some("A"));
        assert_eq!(doc.detail_data_map.len(), 1);
        assert_eq!(doc.table(&c).map(ChapterTable::total), Some(2.0));
    }

    #[test]
    fn renaming_a_line_keeps_its_details() {
        let mut doc = ProjectDocument::new();
        let c = doc.add_root();
        doc.add_line(&c, line("Mur", 1.0, 1.0));
        doc.add_detail_row(&c, 0, DetailLine::new("x"));

        assert!(doc.edit_line(&c, 0, LineColumn::Title, &CellValue::from("Mur porteur")));
        assert!(doc.detail_table(&c, 0).is_some());
    }

    #[test]
    fn detail_total_feeds_line_quantity() {
        let mut doc = ProjectDocument::new();
        let c = doc.add_root();
        doc.add_line(&c, line("Dalle", 0.0, 80.0));
        doc.add_detail_row(&c, 0, DetailLine::new("zone A"));
        for (column, value) in [
            (DetailColumn::Number, 1.0),
            (DetailColumn::Length, 5.0),
            (DetailColumn::Width, 4.0),
            (DetailColumn::Height, 0.5),
        ] {
            assert!(doc.edit_detail(&c, 0, 0, column, &CellValue::Number(value)));
        }
        assert!(!doc.edit_detail(&c, 0, 0, DetailColumn::Total, &CellValue::Number(1.0)));

        assert_eq!(doc.apply_detail_quantity(&c, 0), Some(10.0));
        assert_eq!(doc.table(&c).map(ChapterTable::total), Some(800.0));
    }

    #[test]
    fn unknown_chapter_is_ignored() {
        let mut doc = ProjectDocument::new();
        assert!(doc.add_line("ghost", MainTableLine::new()).is_none());
        assert!(!doc.edit_line("ghost", 0, LineColumn::Title, &CellValue::from("x")));
        assert!(doc.delete_line("ghost", 0).is_none());
        assert!(!doc.set_note("ghost", "x"));
        assert_eq!(doc, ProjectDocument::new());
    }
}
