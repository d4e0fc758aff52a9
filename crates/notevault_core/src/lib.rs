//! Core domain logic for NoteVault.
//! This crate owns the folder tree, note, attachment and backup invariants.

pub mod blob;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;
pub mod vault;

pub use blob::{BlobError, BlobStore, FsBlobStore, RemoveOutcome};
pub use config::{CoreConfig, UploadLimits, UploadPreset};
pub use error::{CoreError, CoreResult, EntityKind, ErrorKind, StorageError, StructuralViolation};
pub use logging::{default_log_level, init_logging, init_logging_for, logging_status, LoggingError};
pub use model::attachment::{Attachment, AttachmentId, UploadFile};
pub use model::folder::{Folder, FolderId, FolderStats, FolderTreeNode, ROOT_FOLDER_ID};
pub use model::note::{Note, NoteId};
pub use model::snapshot::{
    BackupRecord, BackupStats, ExportedBackup, ImportSummary, Snapshot, SnapshotData,
    SnapshotManifest,
};
pub use model::validation::ValidationError;
pub use service::attachment_service::{AttachmentService, BatchUploadReport, UploadFault};
pub use service::backup_service::BackupService;
pub use service::folder_service::FolderService;
pub use service::note_service::NoteService;
pub use store::{Store, StoreError, TxMode};
pub use vault::NoteVault;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
