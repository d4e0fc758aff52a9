//! Attachment domain model.
//!
//! # Invariants
//! - `storage_key` is a generated file name (`<uuid>[.<ext>]`) under the
//!   managed upload root; it never contains path separators.
//! - A row exists exactly when its blob exists.

use crate::model::note::NoteId;
use serde::{Deserialize, Serialize};

/// Stable attachment identifier.
pub type AttachmentId = i64;

/// Relational half of an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    /// Generated on-disk file name.
    pub storage_key: String,
    /// Display name supplied by the uploader.
    pub original_name: String,
    /// Absolute blob path at upload time.
    pub storage_path: String,
    pub note_id: NoteId,
    /// Epoch ms upload timestamp.
    pub uploaded_at: i64,
}

/// Incoming file payload for the dual-write coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub original_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(original_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            original_name: original_name.into(),
            bytes: bytes.into(),
        }
    }
}
