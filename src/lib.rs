//! Metre-RS: bill-of-quantities modelling with versioned persistence
//!
//! A project is an outline of chapters, each holding priced line items that
//! can be broken down into dimensional detail rows. This crate keeps the
//! totals of that structure consistent, stores named versions of it in a
//! shared key-value store, notifies other contexts of changes, and flattens
//! it into an editable project summary.

/// Project summary
pub mod consolidation;

/// Working document of one version
pub mod document;

/// Backend payloads
pub mod payload;

/// Quantity calculator and line tables
pub mod quantity;

/// Storage adapters
pub mod storage;

/// Cross-context change signalling
pub mod sync;

/// Chapter tree model
pub mod tree;

/// Core types
pub mod types;

/// Version store
pub mod version;

/// Composition root
pub mod workspace;

pub use consolidation::{Consolidation, ConsolidatedRow, EditOutcome};
pub use document::ProjectDocument;
pub use quantity::{ChapterTable, DetailLine, DetailTable, LineColumn, MainTableLine};
pub use tree::{ChapterNode, ChapterTree};
pub use types::{CellValue, Error, Result};
pub use version::{ProjectVersion, VersionStore};
pub use workspace::{LoadState, PersistMode, ProjectBackend, Workspace, WorkspaceConfig};
