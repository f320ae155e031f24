//! Version Store
//!
//! A project holds any number of named versions, each an isolated
//! [`ProjectDocument`]. Exactly one version is active; its working state
//! lives in the caller's [`WorkingState`] and is persisted under keys
//! namespaced by the version id. The version list (with the last snapshot of
//! every version) and the active id are stored under global keys.

use crate::document::{ProjectDocument, Slice};
use crate::storage::Storage;
use crate::sync::keys::{self, VersionKeys};
use crate::types::{Error, Result, VersionId};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Name given to the version created on first use
pub const DEFAULT_VERSION_NAME: &str = "Version par défaut";

/// A named snapshot of the project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectVersion {
    pub id: VersionId,
    pub name: String,
    pub created_at: DateTime<Utc>,

    /// Snapshot taken when the version was last left
    #[serde(flatten)]
    pub data: ProjectDocument,
}

impl ProjectVersion {
    fn empty(id: impl Into<VersionId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            created_at: Utc::now(),
            data: ProjectDocument::default(),
        }
    }
}

/// Selection and tab of the editor, persisted per version
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub selected_key: Option<String>,
    pub active_tab: Option<String>,
}

/// Everything the active version's editor works on
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkingState {
    pub document: ProjectDocument,
    pub view: ViewState,
}

#[derive(Debug, Clone, PartialEq)]
enum StoreState {
    Uninitialized,
    Active(VersionId),
}

/// Named versions of one project and the active one
pub struct VersionStore {
    storage: Arc<Storage>,

    /// Origin name used for writes
    origin: String,

    versions: Vec<ProjectVersion>,
    state: StoreState,
}

impl VersionStore {
    pub fn new(storage: Arc<Storage>, origin: impl Into<String>) -> Self {
        Self {
            storage,
            origin: origin.into(),
            versions: Vec::new(),
            state: StoreState::Uninitialized,
        }
    }

    /// Resolve the active version, creating the default one if none exists,
    /// and load its working state.
    pub async fn initialize(&mut self) -> Result<WorkingState> {
        self.versions = self.read_versions().await?;
        if self.versions.is_empty() {
            info!("creating default version");
            self.versions
                .push(ProjectVersion::empty(keys::DEFAULT_VERSION_ID, DEFAULT_VERSION_NAME));
        }

        let stored = self.storage.get_fresh(keys::CURRENT_VERSION).await?;
        let active = stored
            .filter(|id| self.position(id).is_some())
            .or_else(|| self.versions.first().map(|v| v.id.clone()))
            .unwrap_or_else(|| keys::DEFAULT_VERSION_ID.to_string());

        let working = self.load_working(&active).await?;
        self.state = StoreState::Active(active.clone());
        self.write_versions().await?;
        self.storage.set(keys::CURRENT_VERSION, &active, &self.origin).await?;

        debug!(version = %active, "version store initialized");
        Ok(working)
    }

    pub fn list_versions(&self) -> &[ProjectVersion] {
        &self.versions
    }

    /// Id of the active version, `None` before initialization
    pub fn active(&self) -> Option<&str> {
        match &self.state {
            StoreState::Active(id) => Some(id.as_str()),
            StoreState::Uninitialized => None,
        }
    }

    /// Keys of the active version
    pub fn active_keys(&self) -> Option<VersionKeys> {
        self.active().map(VersionKeys::for_version)
    }

    /// Append an empty version and make it active.
    ///
    /// The outgoing version is snapshotted first. `working` is cleared.
    pub async fn create_version(&mut self, name: &str, working: &mut WorkingState) -> Result<VersionId> {
        let outgoing = self.require_active()?;
        self.snapshot(&outgoing, working).await?;

        let version = ProjectVersion::empty(Uuid::new_v4().to_string(), name);
        let id = version.id.clone();
        self.versions.push(version);

        *working = WorkingState::default();
        self.state = StoreState::Active(id.clone());
        self.write_working(&id, working).await?;
        self.write_versions().await?;
        self.storage.set(keys::CURRENT_VERSION, &id, &self.origin).await?;

        info!(version = %id, name, "version created");
        Ok(id)
    }

    /// Snapshot the active version and load `target` into `working`.
    ///
    /// Persisted keys of the target win over its in-memory snapshot.
    pub async fn switch_version(&mut self, target: &str, working: &mut WorkingState) -> Result<()> {
        if self.position(target).is_none() {
            return Err(Error::VersionNotFound(target.to_string()));
        }
        let outgoing = self.require_active()?;
        self.snapshot(&outgoing, working).await?;

        *working = self.load_working(target).await?;
        self.state = StoreState::Active(target.to_string());
        self.write_versions().await?;
        self.storage.set(keys::CURRENT_VERSION, target, &self.origin).await?;

        info!(from = %outgoing, to = %target, "version switched");
        Ok(())
    }

    /// Follow a switch made by another context.
    ///
    /// Nothing is written. Returns `false` when `target` is already active.
    pub async fn adopt(&mut self, target: &str, working: &mut WorkingState) -> Result<bool> {
        if self.active() == Some(target) {
            return Ok(false);
        }
        let stored = self.read_versions().await?;
        if !stored.is_empty() {
            self.versions = stored;
        }
        if self.position(target).is_none() {
            return Err(Error::VersionNotFound(target.to_string()));
        }

        *working = self.load_working(target).await?;
        self.state = StoreState::Active(target.to_string());
        info!(version = %target, "adopted version switch");
        Ok(true)
    }

    /// Key/value pairs persisting one slice of the active version.
    ///
    /// The default version also writes its legacy keys.
    pub fn slice_writes(&self, document: &ProjectDocument, slice: Slice) -> Result<Vec<(String, String)>> {
        let id = self.require_active()?;
        let value = document.slice_json(slice)?;
        Ok(key_sets(&id)
            .iter()
            .map(|keys| (keys.slice(slice).to_string(), value.clone()))
            .collect())
    }

    /// Key/value pairs persisting the view state of the active version
    pub fn view_writes(&self, view: &ViewState) -> Result<Vec<(String, String)>> {
        let id = self.require_active()?;
        let mut writes = Vec::new();
        for keys in key_sets(&id) {
            writes.extend(view_pairs(&keys, view)?);
        }
        Ok(writes)
    }

    /// Write one slice of the active version now.
    pub async fn persist_slice(&self, document: &ProjectDocument, slice: Slice) -> Result<()> {
        for (key, value) in self.slice_writes(document, slice)? {
            self.storage.set(&key, &value, &self.origin).await?;
        }
        Ok(())
    }

    /// Write the view state of the active version now.
    pub async fn persist_view(&self, view: &ViewState) -> Result<()> {
        for (key, value) in self.view_writes(view)? {
            self.storage.set(&key, &value, &self.origin).await?;
        }
        Ok(())
    }

    /// Re-read one slice of the active version from storage.
    ///
    /// Returns `false` when nothing valid is stored for it.
    pub async fn reload_slice(&self, document: &mut ProjectDocument, slice: Slice) -> Result<bool> {
        let id = self.require_active()?;
        for keys in key_sets(&id) {
            let key = keys.slice(slice);
            let Some(raw) = self.storage.get_fresh(key).await? else {
                continue;
            };
            match document.load_slice_json(slice, &raw) {
                Ok(()) => {
                    document.rollup_all();
                    return Ok(true);
                }
                Err(err) => warn!(key = %key, error = %err, "malformed slice ignored"),
            }
        }
        Ok(false)
    }

    /* ------------------------------ internals ----------------------------- */

    fn position(&self, id: &str) -> Option<usize> {
        self.versions.iter().position(|v| v.id == id)
    }

    fn require_active(&self) -> Result<VersionId> {
        self.active()
            .map(str::to_string)
            .ok_or_else(|| Error::InvalidOperation("version store not initialized".into()))
    }

    /// Store `working` into the record of `id` and under its keys.
    async fn snapshot(&mut self, id: &str, working: &WorkingState) -> Result<()> {
        if let Some(index) = self.position(id) {
            self.versions[index].data = working.document.clone();
        }
        self.write_working(id, working).await
    }

    async fn write_working(&self, id: &str, working: &WorkingState) -> Result<()> {
        let mut writes = Vec::new();
        for keys in key_sets(id) {
            for slice in Slice::ALL {
                writes.push((keys.slice(slice).to_string(), working.document.slice_json(slice)?));
            }
            writes.extend(view_pairs(&keys, &working.view)?);
        }
        for (key, value) in writes {
            self.storage.set(&key, &value, &self.origin).await?;
        }
        Ok(())
    }

    /// Working state of `id`: keys first, then its snapshot, then empty.
    async fn load_working(&self, id: &str) -> Result<WorkingState> {
        let mut document = self
            .position(id)
            .map(|index| self.versions[index].data.clone())
            .unwrap_or_default();

        let sets = key_sets(id);
        for slice in Slice::ALL {
            for keys in &sets {
                let key = keys.slice(slice);
                let Some(raw) = self.storage.get_fresh(key).await? else {
                    continue;
                };
                match document.load_slice_json(slice, &raw) {
                    Ok(()) => break,
                    Err(err) => warn!(key = %key, error = %err, "malformed slice ignored"),
                }
            }
        }
        document.rollup_all();

        // The first key present wins, even when it stores a cleared value.
        let mut selected_key = None;
        let mut active_tab = None;
        for keys in &sets {
            if selected_key.is_none() {
                selected_key = self.read_json::<Option<String>>(&keys.selected_key).await?;
            }
            if active_tab.is_none() {
                active_tab = self.read_json::<Option<String>>(&keys.active_tab).await?;
            }
        }
        let view = ViewState {
            selected_key: selected_key.flatten(),
            active_tab: active_tab.flatten(),
        };

        debug!(version = %id, chapters = document.tree().len(), "working state loaded");
        Ok(WorkingState { document, view })
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.storage.get_fresh(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(key = %key, error = %err, "malformed value ignored");
                Ok(None)
            }
        }
    }

    async fn read_versions(&self) -> Result<Vec<ProjectVersion>> {
        Ok(self
            .read_json::<Vec<ProjectVersion>>(keys::PROJECT_VERSIONS)
            .await?
            .unwrap_or_default())
    }

    async fn write_versions(&self) -> Result<()> {
        let raw = serde_json::to_string(&self.versions)?;
        self.storage.set(keys::PROJECT_VERSIONS, &raw, &self.origin).await
    }
}

/// Namespaced keys of `id`, followed by the legacy keys for the default
/// version
fn key_sets(id: &str) -> Vec<VersionKeys> {
    let mut sets = vec![VersionKeys::for_version(id)];
    if id == keys::DEFAULT_VERSION_ID {
        sets.push(VersionKeys::legacy());
    }
    sets
}

fn view_pairs(keys: &VersionKeys, view: &ViewState) -> Result<Vec<(String, String)>> {
    Ok(vec![
        (keys.selected_key.clone(), serde_json::to_string(&view.selected_key)?),
        (keys.active_tab.clone(), serde_json::to_string(&view.active_tab)?),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::MainTableLine;
    use crate::storage::StorageConfig;

    async fn store() -> (Arc<Storage>, VersionStore) {
        let storage = Arc::new(Storage::new(StorageConfig::Memory).await.unwrap());
        let store = VersionStore::new(storage.clone(), "test");
        (storage, store)
    }

    #[tokio::test]
    async fn initialize_creates_default_version() {
        let (storage, mut store) = store().await;
        let working = store.initialize().await.unwrap();

        assert_eq!(store.active(), Some(keys::DEFAULT_VERSION_ID));
        assert_eq!(store.list_versions().len(), 1);
        assert_eq!(store.list_versions()[0].name, DEFAULT_VERSION_NAME);
        assert!(working.document.tree().is_empty());
        assert_eq!(
            storage.get(keys::CURRENT_VERSION).await.unwrap().as_deref(),
            Some(keys::DEFAULT_VERSION_ID)
        );
    }

    #[tokio::test]
    async fn default_version_reads_legacy_keys() {
        let (storage, mut store) = store().await;
        let mut legacy = ProjectDocument::new();
        let key = legacy.add_root();
        storage
            .set(keys::TREE_DATA, &legacy.slice_json(Slice::Tree).unwrap(), "old")
            .await
            .unwrap();

        let working = store.initialize().await.unwrap();
        assert!(working.document.tree().contains(&key));
    }

    #[tokio::test]
    async fn create_version_starts_empty() {
        let (_, mut store) = store().await;
        let mut working = store.initialize().await.unwrap();
        let chapter = working.document.add_root();
        working.document.add_line(&chapter, MainTableLine::new());

        let id = store.create_version("Variante", &mut working).await.unwrap();
        assert_eq!(store.active(), Some(id.as_str()));
        assert_eq!(working, WorkingState::default());
        assert!(store.list_versions()[0].data.tree().contains(&chapter));
    }

    #[tokio::test]
    async fn switching_to_unknown_version_fails() {
        let (_, mut store) = store().await;
        let mut working = store.initialize().await.unwrap();
        let err = store.switch_version("nope", &mut working).await.unwrap_err();
        assert!(matches!(err, Error::VersionNotFound(id) if id == "nope"));
        assert_eq!(store.active(), Some(keys::DEFAULT_VERSION_ID));
    }

    #[tokio::test]
    async fn keys_win_over_snapshot() {
        let (storage, mut store) = store().await;
        let mut working = store.initialize().await.unwrap();
        let b = store.create_version("B", &mut working).await.unwrap();
        store.switch_version(keys::DEFAULT_VERSION_ID, &mut working).await.unwrap();

        // Another context edits B while it is not active here.
        let mut edited = ProjectDocument::new();
        let key = edited.add_root();
        let tree_key = VersionKeys::for_version(&b).tree;
        storage
            .set(&tree_key, &edited.slice_json(Slice::Tree).unwrap(), "other")
            .await
            .unwrap();

        store.switch_version(&b, &mut working).await.unwrap();
        assert!(working.document.tree().contains(&key));
    }

    #[tokio::test]
    async fn cleared_selection_survives_switch() {
        let (storage, mut store) = store().await;
        let mut working = store.initialize().await.unwrap();
        let chapter = working.document.add_root();

        working.view.selected_key = Some(chapter.clone());
        store.persist_view(&working.view).await.unwrap();
        working.view.selected_key = None;
        store.persist_view(&working.view).await.unwrap();
        assert_eq!(
            storage.get(&VersionKeys::legacy().selected_key).await.unwrap().as_deref(),
            Some("null")
        );

        store.create_version("B", &mut working).await.unwrap();
        store.switch_version(keys::DEFAULT_VERSION_ID, &mut working).await.unwrap();
        assert_eq!(working.view.selected_key, None);
    }

    #[tokio::test]
    async fn malformed_version_list_is_treated_as_empty() {
        let (storage, mut store) = store().await;
        storage.set(keys::PROJECT_VERSIONS, "not json", "old").await.unwrap();
        store.initialize().await.unwrap();
        assert_eq!(store.list_versions().len(), 1);
    }
}
