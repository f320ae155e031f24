//! Persisted key schema

use crate::document::Slice;

pub const TREE_DATA: &str = "metreTreeData";
pub const TABLE_DATA: &str = "metreTableData";
pub const DETAIL_DATA: &str = "metreDetailData";
pub const CHAPTER_TEXT: &str = "metreChapterText";
pub const SELECTED_KEY: &str = "metreSelectedKey";
pub const ACTIVE_TAB: &str = "metreActiveTab";

/// JSON list of every version record
pub const PROJECT_VERSIONS: &str = "metreProjectVersions";

/// Raw id of the active version
pub const CURRENT_VERSION: &str = "metreCurrentVersion";

/// Last `{timestamp, source}` change signal
pub const MODIFICATION_SIGNAL: &str = "projectModifications";

/// Id of the version created on first use
pub const DEFAULT_VERSION_ID: &str = "default";

/// Keys holding one version's working state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionKeys {
    pub tree: String,
    pub tables: String,
    pub details: String,
    pub chapter_text: String,
    pub selected_key: String,
    pub active_tab: String,
}

impl VersionKeys {
    /// `<base>_<version>` keys
    pub fn for_version(version: &str) -> Self {
        let key = |base: &str| format!("{}_{}", base, version);
        Self {
            tree: key(TREE_DATA),
            tables: key(TABLE_DATA),
            details: key(DETAIL_DATA),
            chapter_text: key(CHAPTER_TEXT),
            selected_key: key(SELECTED_KEY),
            active_tab: key(ACTIVE_TAB),
        }
    }

    /// Un-namespaced keys, kept for the default version only
    pub fn legacy() -> Self {
        Self {
            tree: TREE_DATA.to_string(),
            tables: TABLE_DATA.to_string(),
            details: DETAIL_DATA.to_string(),
            chapter_text: CHAPTER_TEXT.to_string(),
            selected_key: SELECTED_KEY.to_string(),
            active_tab: ACTIVE_TAB.to_string(),
        }
    }

    /// Key of a document slice
    pub fn slice(&self, slice: Slice) -> &str {
        match slice {
            Slice::Tree => self.tree.as_str(),
            Slice::Tables => self.tables.as_str(),
            Slice::Details => self.details.as_str(),
            Slice::Notes => self.chapter_text.as_str(),
        }
    }

    /// Which document slice a key holds, if any
    pub fn slice_of(&self, key: &str) -> Option<Slice> {
        Slice::ALL
            .into_iter()
            .find(|&s| self.slice(s) == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slice_of(key).is_some() || key == self.selected_key || key == self.active_tab
    }
}
