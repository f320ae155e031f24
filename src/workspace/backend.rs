//! Remote project service

use crate::payload::ProjectFull;
use crate::types::Result;
use async_trait::async_trait;

/// Loads and saves whole projects.
///
/// Implementations report transport and server failures as
/// [`crate::types::Error::Backend`].
#[async_trait]
pub trait ProjectBackend: Send + Sync {
    /// Fetch the project with its chapters, lines and details
    async fn load_full(&self, project_id: i64) -> Result<ProjectFull>;

    /// Replace the stored project with `project`
    async fn save_full(&self, project_id: i64, project: &ProjectFull) -> Result<()>;
}

/// Progress of the last backend load
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

impl LoadState {
    pub fn is_failed(&self) -> bool {
        matches!(self, LoadState::Failed(_))
    }
}
