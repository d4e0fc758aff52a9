//! Folder domain model.
//!
//! # Invariants
//! - Only the Root folder has `parent_id == None`.
//! - Folder names are unique among siblings (case-sensitive).

use serde::{Deserialize, Serialize};

/// Stable folder identifier.
pub type FolderId = i64;

/// Identity of the Root folder seeded by the first schema migration.
pub const ROOT_FOLDER_ID: FolderId = 1;

/// One node in the folder tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    /// Parent folder. `None` only for Root.
    pub parent_id: Option<FolderId>,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
}

impl Folder {
    /// Returns whether this folder is the tree anchor.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Direct-child counts for one folder. Descendants are not rolled up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderStats {
    pub subfolders: u64,
    pub notes: u64,
    /// Attachments owned by notes that sit directly in the folder.
    pub attachments: u64,
}

/// Nested read view derived on demand from the flat parent map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderTreeNode {
    #[serde(flatten)]
    pub folder: Folder,
    pub children: Vec<FolderTreeNode>,
}
