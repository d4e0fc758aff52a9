//! Backup snapshot documents and backup bookkeeping records.
//!
//! # Responsibility
//! - Define the on-disk JSON shape written by export and read by import.
//! - Carry history/statistics read models for stored exports.
//!
//! # Invariants
//! - Manifest counts always include attachments, even when the attachment
//!   array in `data` is empty because blobs were not exported.
//! - Snapshots are write-once: nothing in core mutates a stored snapshot.

use crate::model::attachment::Attachment;
use crate::model::folder::Folder;
use crate::model::note::Note;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Snapshot document schema version written by this crate.
pub const SNAPSHOT_SCHEMA_VERSION: &str = "1.0.0";

/// Versioned description of one export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub include_attachments: bool,
    #[serde(default)]
    pub total_folders: u64,
    #[serde(default)]
    pub total_notes: u64,
    #[serde(default)]
    pub total_attachments: u64,
}

/// Full data arrays of one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotData {
    pub folders: Vec<Folder>,
    pub notes: Vec<Note>,
    /// Empty unless the export included blobs.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Manifest plus data, serialized as one JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotManifest,
    pub data: SnapshotData,
}

/// Outcome counters for one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Folders and notes inserted or overwritten.
    pub imported_count: u64,
    /// Folders and notes left untouched because a match existed.
    pub skipped_count: u64,
    /// Attachment blobs restored alongside newly inserted notes.
    pub attachments_restored: u64,
}

/// One stored export as listed by backup history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    /// Export directory name, used as the backup handle.
    pub name: String,
    /// Snapshot document file name inside the export directory.
    pub file_name: String,
    /// Absolute snapshot document path.
    pub path: PathBuf,
    /// Total bytes of the export directory, copied blobs included.
    pub size_bytes: u64,
    pub manifest: SnapshotManifest,
}

/// Aggregate statistics over all stored exports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackupStats {
    pub total_backups: u64,
    pub total_size: u64,
    pub oldest_backup: Option<DateTime<Utc>>,
    pub newest_backup: Option<DateTime<Utc>>,
    pub average_size: u64,
}

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedBackup {
    pub record: BackupRecord,
    pub snapshot: Snapshot,
}
