//! Workspace: the composition root of one execution context
//!
//! A [`Workspace`] owns the working state of the active version together
//! with the storage handle, the version store, the change signaler and the
//! optional debounced writer. Every editing operation mutates the working
//! document, persists the slices it touched under the active version's keys
//! and signals the change to other contexts.

mod backend;

pub use backend::{LoadState, ProjectBackend};

use crate::consolidation::{Consolidation, EditOutcome};
use crate::document::{ProjectDocument, Slice};
use crate::payload::{Project, ProjectFull};
use crate::quantity::{DetailColumn, DetailLine, LineColumn, MainTableLine};
use crate::storage::{Storage, StorageConfig};
use crate::sync::{keys, ChangeSignaler, Clock, DebouncedWriter, SyncConfig, SyncEvent, SyncWatcher, SystemClock};
use crate::types::{CellValue, ChapterKey, Error, Result, VersionId};
use crate::version::{ProjectVersion, VersionStore, ViewState, WorkingState};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How edits reach storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistMode {
    /// Every edit is written and signalled before the operation returns
    #[default]
    Immediate,

    /// Edits are coalesced and written after the debounce delay
    Debounced,
}

/// Workspace configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub persist: PersistMode,

    /// Change-signal source name of this context
    pub source: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            sync: SyncConfig::default(),
            persist: PersistMode::default(),
            source: "metre".to_string(),
        }
    }
}

/// Editing state of one context over a shared project store
pub struct Workspace {
    config: WorkspaceConfig,
    /// Origin tag of this instance's storage writes
    instance_id: String,
    storage: Arc<Storage>,
    signaler: Arc<ChangeSignaler>,
    versions: VersionStore,
    working: WorkingState,
    writer: Option<DebouncedWriter>,
    project: Option<Project>,
    load_state: LoadState,
}

impl Workspace {
    /// Open the configured storage and load the active version.
    pub async fn open(config: WorkspaceConfig) -> Result<Self> {
        let storage = Arc::new(Storage::new(config.storage.clone()).await?);
        Self::with_storage(storage, config, Arc::new(SystemClock)).await
    }

    /// Attach to an existing storage, e.g. one shared with other contexts.
    pub async fn with_storage(storage: Arc<Storage>, config: WorkspaceConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let instance_id = Uuid::new_v4().to_string();
        let signaler = Arc::new(
            ChangeSignaler::new(storage.clone(), clock, config.sync.suppression_window())
                .with_origin(instance_id.clone()),
        );
        let mut versions = VersionStore::new(storage.clone(), instance_id.clone());
        let working = versions.initialize().await?;

        let writer = match config.persist {
            PersistMode::Immediate => None,
            PersistMode::Debounced => Some(DebouncedWriter::spawn(
                storage.clone(),
                signaler.clone(),
                config.source.clone(),
                instance_id.clone(),
                config.sync.debounce(),
            )),
        };

        debug!(source = %config.source, instance = %instance_id, "workspace opened");
        Ok(Self {
            config,
            instance_id,
            storage,
            signaler,
            versions,
            working,
            writer,
            project: None,
            load_state: LoadState::Idle,
        })
    }

    /// Origin carried by every storage event this workspace causes.
    ///
    /// Unique per instance, so contexts sharing a `source` name still see
    /// each other's edits.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn document(&self) -> &ProjectDocument {
        &self.working.document
    }

    pub fn view(&self) -> &ViewState {
        &self.working.view
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    /* ------------------------------ chapters ------------------------------ */

    pub async fn add_root_chapter(&mut self) -> Result<ChapterKey> {
        let key = self.working.document.add_root();
        self.persist(&[Slice::Tree]).await?;
        Ok(key)
    }

    /// Add a sub-chapter under `parent`
    pub async fn add_child_chapter(&mut self, parent: &str) -> Result<ChapterKey> {
        let key = self
            .working
            .document
            .add_child(parent)
            .ok_or_else(|| Error::ChapterNotFound(parent.to_string()))?;
        self.persist(&[Slice::Tree]).await?;
        Ok(key)
    }

    pub async fn update_chapter(&mut self, key: &str, num: Option<&str>, label: Option<&str>) -> Result<bool> {
        let changed = self.working.document.update_chapter(key, num, label);
        if changed {
            self.persist(&[Slice::Tree]).await?;
        }
        Ok(changed)
    }

    /// Delete a chapter subtree and everything attached to it.
    pub async fn delete_chapter(&mut self, key: &str) -> Result<Vec<ChapterKey>> {
        let removed = self.working.document.delete_chapter(key);
        if removed.is_empty() {
            return Ok(removed);
        }
        let mut writes = Vec::new();
        for slice in Slice::ALL {
            writes.extend(self.versions.slice_writes(&self.working.document, slice)?);
        }
        if let Some(selected) = &self.working.view.selected_key {
            if removed.contains(selected) {
                self.working.view.selected_key = None;
                writes.extend(self.versions.view_writes(&self.working.view)?);
            }
        }
        self.write(writes).await?;
        Ok(removed)
    }

    /* -------------------------------- lines ------------------------------- */

    /// Append a line to a chapter and return its index
    pub async fn add_line(&mut self, chapter: &str, line: MainTableLine) -> Result<usize> {
        let index = self
            .working
            .document
            .add_line(chapter, line)
            .ok_or_else(|| Error::ChapterNotFound(chapter.to_string()))?;
        self.persist(&[Slice::Tables]).await?;
        Ok(index)
    }

    pub async fn edit_line(
        &mut self,
        chapter: &str,
        line_index: usize,
        column: LineColumn,
        value: &CellValue,
    ) -> Result<bool> {
        let changed = self.working.document.edit_line(chapter, line_index, column, value);
        if changed {
            self.persist(&[Slice::Tables]).await?;
        }
        Ok(changed)
    }

    pub async fn delete_line(&mut self, chapter: &str, line_index: usize) -> Result<Option<MainTableLine>> {
        let removed = self.working.document.delete_line(chapter, line_index);
        if removed.is_some() {
            self.persist(&[Slice::Tables, Slice::Details]).await?;
        }
        Ok(removed)
    }

    /// Copy a line's detail total into its quantity.
    pub async fn apply_detail_quantity(&mut self, chapter: &str, line_index: usize) -> Result<Option<f64>> {
        let quantity = self.working.document.apply_detail_quantity(chapter, line_index);
        if quantity.is_some() {
            self.persist(&[Slice::Tables]).await?;
        }
        Ok(quantity)
    }

    /* ------------------------------- details ------------------------------ */

    pub async fn add_detail_row(&mut self, chapter: &str, line_index: usize, row: DetailLine) -> Result<Option<usize>> {
        let index = self.working.document.add_detail_row(chapter, line_index, row);
        if index.is_some() {
            self.persist(&[Slice::Details]).await?;
        }
        Ok(index)
    }

    pub async fn edit_detail(
        &mut self,
        chapter: &str,
        line_index: usize,
        row_index: usize,
        column: DetailColumn,
        value: &CellValue,
    ) -> Result<bool> {
        let changed = self
            .working
            .document
            .edit_detail(chapter, line_index, row_index, column, value);
        if changed {
            self.persist(&[Slice::Details]).await?;
        }
        Ok(changed)
    }

    pub async fn delete_detail_row(
        &mut self,
        chapter: &str,
        line_index: usize,
        row_index: usize,
    ) -> Result<Option<DetailLine>> {
        let removed = self.working.document.delete_detail_row(chapter, line_index, row_index);
        if removed.is_some() {
            self.persist(&[Slice::Details]).await?;
        }
        Ok(removed)
    }

    /* ---------------------------- notes & view ---------------------------- */

    pub async fn set_note(&mut self, chapter: &str, text: &str) -> Result<bool> {
        let changed = self.working.document.set_note(chapter, text);
        if changed {
            self.persist(&[Slice::Notes]).await?;
        }
        Ok(changed)
    }

    pub async fn select(&mut self, key: Option<&str>) -> Result<()> {
        self.working.view.selected_key = key.map(str::to_string);
        let writes = self.versions.view_writes(&self.working.view)?;
        self.write(writes).await
    }

    pub async fn set_active_tab(&mut self, tab: &str) -> Result<()> {
        self.working.view.active_tab = Some(tab.to_string());
        let writes = self.versions.view_writes(&self.working.view)?;
        self.write(writes).await
    }

    /* ---------------------------- consolidation --------------------------- */

    /// Summary grid of the active version
    pub fn consolidate(&self) -> Consolidation {
        Consolidation::flatten(self.working.document.tree(), &self.working.document.table_data_map)
    }

    /// Apply a summary grid edit to the chapter tables and persist them.
    pub async fn apply_summary_edit(
        &mut self,
        summary: &mut Consolidation,
        row: usize,
        column: LineColumn,
        value: &CellValue,
    ) -> Result<EditOutcome> {
        let outcome = summary.apply_edit(&mut self.working.document.table_data_map, row, column, value);
        if matches!(outcome, EditOutcome::Applied { .. }) {
            self.persist(&[Slice::Tables]).await?;
        }
        Ok(outcome)
    }

    /* ------------------------------ versions ------------------------------ */

    pub fn list_versions(&self) -> &[ProjectVersion] {
        self.versions.list_versions()
    }

    pub fn active_version(&self) -> Option<&str> {
        self.versions.active()
    }

    /// Create an empty version and make it active
    pub async fn create_version(&mut self, name: &str) -> Result<VersionId> {
        self.flush().await?;
        let id = self.versions.create_version(name, &mut self.working).await?;
        self.signaler.signal(&self.config.source).await?;
        Ok(id)
    }

    pub async fn switch_version(&mut self, target: &str) -> Result<()> {
        self.flush().await?;
        self.versions.switch_version(target, &mut self.working).await?;
        self.signaler.signal(&self.config.source).await?;
        Ok(())
    }

    /* ------------------------------- backend ------------------------------ */

    /// Replace the active version's document with a loaded project.
    pub async fn hydrate(&mut self, full: &ProjectFull) -> Result<()> {
        self.working.document = full.to_document();
        self.project = Some(full.project.clone());
        info!(
            chapters = self.working.document.tree().len(),
            "project hydrated"
        );
        self.persist(&Slice::ALL).await
    }

    /// The save request for the active version, once a project is loaded
    pub fn export_payload(&self) -> Option<ProjectFull> {
        let project = self.project.clone()?;
        Some(ProjectFull::from_document(project, &self.working.document))
    }

    /// Fetch a project and hydrate the active version with it.
    ///
    /// On failure the working state is kept and the load state records the
    /// error.
    pub async fn load_from_backend(&mut self, backend: &dyn ProjectBackend, project_id: i64) -> Result<()> {
        self.load_state = LoadState::Loading;
        let full = match backend.load_full(project_id).await {
            Ok(full) => full,
            Err(err) => {
                let err = into_backend_error(err);
                warn!(project = project_id, error = %err, "project load failed");
                self.load_state = LoadState::Failed(err.to_string());
                return Err(err);
            }
        };
        self.hydrate(&full).await?;
        self.load_state = LoadState::Loaded;
        Ok(())
    }

    /// Send the active version to the backend.
    pub async fn save_to_backend(&self, backend: &dyn ProjectBackend) -> Result<()> {
        let payload = self
            .export_payload()
            .ok_or_else(|| Error::InvalidOperation("no project loaded".into()))?;
        let project_id = payload
            .project
            .id
            .ok_or_else(|| Error::InvalidOperation("project has no id".into()))?;
        backend.save_full(project_id, &payload).await.map_err(into_backend_error)?;
        info!(project = project_id, "project saved");
        Ok(())
    }

    /* -------------------------------- sync -------------------------------- */

    /// Watch storage for changes made by other contexts.
    pub fn watch(&self) -> SyncWatcher {
        let known = self.versions.active().unwrap_or(keys::DEFAULT_VERSION_ID).to_string();
        SyncWatcher::spawn(self.storage.clone(), self.config.sync.poll_interval(), known)
    }

    /// React to a change made elsewhere. Returns whether working state changed.
    pub async fn handle_sync_event(&mut self, event: &SyncEvent) -> Result<bool> {
        match event {
            SyncEvent::VersionChanged { current, .. } => {
                self.flush().await?;
                match self.versions.adopt(current, &mut self.working).await {
                    Ok(changed) => Ok(changed),
                    Err(Error::VersionNotFound(id)) => {
                        warn!(version = %id, "switch to an unknown version ignored");
                        Ok(false)
                    }
                    Err(err) => Err(err),
                }
            }
            SyncEvent::Storage(event) if event.origin == self.instance_id => Ok(false),
            SyncEvent::Storage(event) => {
                let Some(active) = self.versions.active_keys() else {
                    return Ok(false);
                };
                if event.key == keys::MODIFICATION_SIGNAL {
                    let mut changed = false;
                    for slice in Slice::ALL {
                        changed |= self.versions.reload_slice(&mut self.working.document, slice).await?;
                    }
                    return Ok(changed);
                }
                match active.slice_of(&event.key) {
                    Some(slice) => {
                        debug!(key = %event.key, origin = %event.origin, "reloading slice");
                        self.versions.reload_slice(&mut self.working.document, slice).await
                    }
                    None => Ok(false),
                }
            }
        }
    }

    /// Write everything held back by the debounced writer.
    pub async fn flush(&self) -> Result<()> {
        match &self.writer {
            Some(writer) => writer.flush().await,
            None => Ok(()),
        }
    }

    /// Flush pending writes and stop background tasks.
    pub async fn close(mut self) -> Result<()> {
        match self.writer.take() {
            Some(writer) => writer.shutdown().await,
            None => Ok(()),
        }
    }

    /* ------------------------------ internals ----------------------------- */

    async fn persist(&self, slices: &[Slice]) -> Result<()> {
        let mut writes = Vec::new();
        for &slice in slices {
            writes.extend(self.versions.slice_writes(&self.working.document, slice)?);
        }
        self.write(writes).await
    }

    async fn write(&self, writes: Vec<(String, String)>) -> Result<()> {
        match &self.writer {
            Some(writer) => {
                for (key, value) in writes {
                    writer.schedule(key, value)?;
                }
                Ok(())
            }
            None => {
                for (key, value) in &writes {
                    self.storage.set(key, value, &self.instance_id).await?;
                }
                self.signaler.signal(&self.config.source).await?;
                Ok(())
            }
        }
    }
}

fn into_backend_error(err: Error) -> Error {
    match err {
        Error::Backend(_) => err,
        other => Error::Backend(other.to_string()),
    }
}
