//! Full-project payload exchanged with the backend
//!
//! `GET /projects/{id}/full` returns a [`ProjectFull`]; `PUT` takes the same
//! shape back. Chapters not yet known to the server travel with a `tempId`
//! and reference unsaved parents through `parentTempId`.

use crate::document::{detail_key, ProjectDocument};
use crate::quantity::{ChapterTable, DetailLine, DetailTable, MainTableLine};
use crate::tree::{ChapterTree, FlatChapter};
use crate::types::{lenient_number, lenient_text, ChapterKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub company_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub num: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub label: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_temp_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainTableLineDto {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub chapter_id: Option<i64>,
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
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_price: f64,
    #[serde(default, deserialize_with = "lenient_text")]
    pub comments: String,
    #[serde(default)]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailTableLineDto {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub main_table_line_id: Option<i64>,
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
    #[serde(default, deserialize_with = "lenient_number")]
    pub total: f64,
    #[serde(default, deserialize_with = "lenient_text")]
    pub comments: String,
    #[serde(default)]
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MainTableLineWithDetails {
    pub main_table_line: MainTableLineDto,
    #[serde(default)]
    pub details: Vec<DetailTableLineDto>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterWithLines {
    pub chapter: Chapter,
    #[serde(default)]
    pub lines: Vec<MainTableLineWithDetails>,
}

/// Body of `GET`/`PUT /projects/{id}/full`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFull {
    #[serde(default)]
    pub project: Project,
    #[serde(default)]
    pub chapters: Vec<ChapterWithLines>,
}

impl ProjectFull {
    /// Build the working document: nested tree, per-chapter tables, detail
    /// tables keyed by line id, and notes from chapter content.
    pub fn to_document(&self) -> ProjectDocument {
        let keys: Vec<ChapterKey> = self.chapters.iter().map(|c| chapter_key(&c.chapter)).collect();
        let by_server_id: BTreeMap<i64, &ChapterKey> = self
            .chapters
            .iter()
            .zip(&keys)
            .filter_map(|(c, key)| c.chapter.id.map(|id| (id, key)))
            .collect();

        let flat = self
            .chapters
            .iter()
            .zip(&keys)
            .map(|(c, key)| FlatChapter {
                key: key.clone(),
                num: c.chapter.num.clone(),
                label: c.chapter.label.clone(),
                parent_id: c
                    .chapter
                    .parent_id
                    .and_then(|p| by_server_id.get(&p).map(|k| (*k).clone()))
                    .or_else(|| c.chapter.parent_temp_id.clone()),
            })
            .collect();

        let mut doc = ProjectDocument {
            tree_data: ChapterTree::build_from_flat(flat),
            ..ProjectDocument::default()
        };

        for (c, key) in self.chapters.iter().zip(&keys) {
            let mut lines = Vec::with_capacity(c.lines.len());
            for with_details in &c.lines {
                let line = line_from_dto(&with_details.main_table_line);
                if !with_details.details.is_empty() {
                    let rows = with_details.details.iter().map(detail_from_dto).collect();
                    doc.detail_data_map
                        .insert(detail_key(key, &line.id), DetailTable::from_rows(rows));
                }
                lines.push(line);
            }
            doc.table_data_map.insert(key.clone(), ChapterTable::from_rows(lines));

            if let Some(content) = c.chapter.content.as_deref().filter(|s| !s.is_empty()) {
                doc.chapter_text_map.insert(key.clone(), content.to_string());
            }
        }
        doc
    }

    /// Inverse of [`ProjectFull::to_document`] for the save request.
    pub fn from_document(project: Project, doc: &ProjectDocument) -> Self {
        let empty = ChapterTable::default();
        let chapters = doc
            .tree()
            .flatten()
            .into_iter()
            .map(|flat| {
                let server_id = flat.key.parse::<i64>().ok();
                let parent_server_id = flat.parent_id.as_deref().and_then(|p| p.parse::<i64>().ok());
                let chapter = Chapter {
                    id: server_id,
                    project_id: project.id,
                    parent_id: parent_server_id,
                    num: flat.num.clone(),
                    label: flat.label.clone(),
                    content: doc.chapter_text_map.get(&flat.key).cloned(),
                    temp_id: server_id.is_none().then(|| flat.key.clone()),
                    parent_temp_id: flat.parent_id.clone().filter(|_| parent_server_id.is_none()),
                };

                let table = doc.table(&flat.key).unwrap_or(&empty);
                let lines = table
                    .rows()
                    .iter()
                    .enumerate()
                    .map(|(position, line)| {
                        let details = doc
                            .detail_data_map
                            .get(&detail_key(&flat.key, &line.id))
                            .map(|t| {
                                t.rows()
                                    .iter()
                                    .enumerate()
                                    .map(|(p, d)| detail_to_dto(d, p))
                                    .collect()
                            })
                            .unwrap_or_default();
                        MainTableLineWithDetails {
                            main_table_line: line_to_dto(line, server_id, position),
                            details,
                        }
                    })
                    .collect();

                ChapterWithLines { chapter, lines }
            })
            .collect();

        Self { project, chapters }
    }
}

fn chapter_key(chapter: &Chapter) -> ChapterKey {
    chapter
        .id
        .map(|id| id.to_string())
        .or_else(|| chapter.temp_id.clone())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn line_from_dto(dto: &MainTableLineDto) -> MainTableLine {
    let mut line = MainTableLine {
        gr: dto.gr.clone(),
        num: dto.num.clone(),
        title: dto.title.clone(),
        nm: dto.nm.clone(),
        unit: dto.unit.clone(),
        quantity: dto.quantity,
        unit_price: dto.unit_price,
        comments: dto.comments.clone(),
        ..MainTableLine::new()
    };
    if let Some(id) = dto.id {
        line.id = id.to_string();
    }
    line
}

fn line_to_dto(line: &MainTableLine, chapter_id: Option<i64>, position: usize) -> MainTableLineDto {
    MainTableLineDto {
        id: line.id.parse().ok(),
        chapter_id,
        gr: line.gr.clone(),
        num: line.num.clone(),
        title: line.title.clone(),
        nm: line.nm.clone(),
        unit: line.unit.clone(),
        quantity: line.quantity,
        unit_price: line.unit_price,
        total_price: line.total_price,
        comments: line.comments.clone(),
        position: Some(position as i64),
    }
}

fn detail_from_dto(dto: &DetailTableLineDto) -> DetailLine {
    DetailLine {
        number: dto.number,
        length: dto.length,
        width: dto.width,
        height: dto.height,
        factor: dto.factor,
        comments: dto.comments.clone(),
        ..DetailLine::new(dto.title.clone())
    }
}

fn detail_to_dto(detail: &DetailLine, position: usize) -> DetailTableLineDto {
    DetailTableLineDto {
        id: None,
        main_table_line_id: None,
        title: detail.title.clone(),
        number: detail.number,
        length: detail.length,
        width: detail.width,
        height: detail.height,
        factor: detail.factor,
        total: detail.total,
        comments: detail.comments.clone(),
        position: Some(position as i64),
    }
}
