//! Note domain model.

use crate::model::folder::FolderId;
use serde::{Deserialize, Serialize};

/// Stable note identifier.
pub type NoteId = i64;

/// Text note, optionally filed into a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// Owning folder. `None` means unfiled.
    pub folder_id: Option<FolderId>,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
}
