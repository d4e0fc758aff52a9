//! Attachment dual-write coordinator.
//!
//! # Responsibility
//! - Keep an attachment row and its blob consistent without a shared
//!   transaction, using ordered writes plus compensation.
//! - Report per-file outcomes for batch uploads.
//!
//! # Invariants
//! - Upload writes the blob first, then the row; if the row write fails for
//!   any reason the blob is removed before the error is returned.
//! - Delete removes the row first, then the blob; a missing blob is tolerated.
//! - Compensation failures are logged and never change the caller's outcome.
//! - Upload row writes wait at most `CoreConfig::db_wait` for the store.

use crate::blob::{BlobStore, RemoveOutcome};
use crate::config::{CoreConfig, UploadLimits};
use crate::error::{CoreError, CoreResult, EntityKind, ErrorKind};
use crate::model::attachment::{Attachment, AttachmentId, UploadFile};
use crate::model::note::NoteId;
use crate::model::validation::{allowed_extension, ValidationError};
use crate::repo::attachment_repo::{
    AttachmentRepository, NewAttachment, SqliteAttachmentRepository,
};
use crate::repo::note_repo::{NoteRepository, SqliteNoteRepository};
use crate::service::log_outcome;
use crate::store::{Store, TxMode};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// One rejected file of a batch upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadFault {
    /// Position of the file in the request.
    pub index: usize,
    pub original_name: String,
    pub kind: ErrorKind,
    /// Caller-safe message.
    pub message: String,
}

/// Outcome of a batch upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchUploadReport {
    pub uploaded: Vec<Attachment>,
    pub failed: Vec<UploadFault>,
}

impl BatchUploadReport {
    /// Some files were stored and some were rejected.
    pub fn is_partial_failure(&self) -> bool {
        !self.uploaded.is_empty() && !self.failed.is_empty()
    }
}

/// Coordinates attachment rows with blobs in the upload root.
pub struct AttachmentService<B: BlobStore> {
    store: Arc<Store>,
    blobs: Arc<B>,
    limits: UploadLimits,
    db_wait: Duration,
    debug_errors: bool,
}

impl<B: BlobStore> AttachmentService<B> {
    pub fn new(store: Arc<Store>, blobs: Arc<B>, config: &CoreConfig) -> Self {
        Self {
            store,
            blobs,
            limits: config.upload_limits,
            db_wait: config.db_wait,
            debug_errors: config.debug_errors,
        }
    }

    pub fn limits(&self) -> UploadLimits {
        self.limits
    }

    /// Stores one file for `note_id`.
    pub fn upload(&self, note_id: NoteId, file: &UploadFile) -> CoreResult<Attachment> {
        let started_at = Instant::now();
        let result = self.upload_one(note_id, file);
        log_outcome("attachment_upload", "attachment", started_at, result)
    }

    /// Stores several files for `note_id`, collecting per-file faults.
    ///
    /// An unknown note or an oversized request fails as a whole before any
    /// blob is written.
    pub fn upload_batch(
        &self,
        note_id: NoteId,
        files: &[UploadFile],
    ) -> CoreResult<BatchUploadReport> {
        let started_at = Instant::now();
        let result = self.check_batch(note_id, files).map(|()| {
            let mut report = BatchUploadReport::default();
            for (index, file) in files.iter().enumerate() {
                match self.upload_one(note_id, file) {
                    Ok(attachment) => report.uploaded.push(attachment),
                    Err(err) => {
                        warn!(
                            "event=attachment_upload module=attachment status=error note_id={} index={} error_code={} error={}",
                            note_id,
                            index,
                            err.kind().as_str(),
                            err
                        );
                        report.failed.push(UploadFault {
                            index,
                            original_name: file.original_name.clone(),
                            kind: err.kind(),
                            message: err.public_message(self.debug_errors),
                        });
                    }
                }
            }
            info!(
                "event=attachment_batch module=attachment status=ok note_id={} uploaded={} failed={}",
                note_id,
                report.uploaded.len(),
                report.failed.len()
            );
            report
        });
        log_outcome("attachment_batch_upload", "attachment", started_at, result)
    }

    /// Removes one attachment: row first, then blob.
    pub fn delete(&self, id: AttachmentId) -> CoreResult<()> {
        let started_at = Instant::now();
        let result = self
            .store
            .run(TxMode::Write, |tx| -> CoreResult<Attachment> {
                let repo = SqliteAttachmentRepository::new(tx);
                let attachment = repo
                    .get(id)?
                    .ok_or_else(|| CoreError::not_found(EntityKind::Attachment, id))?;
                repo.delete(id)?;
                Ok(attachment)
            })
            .map(|attachment| remove_blob_best_effort(self.blobs.as_ref(), &attachment));
        log_outcome("attachment_delete", "attachment", started_at, result)
    }

    pub fn get(&self, id: AttachmentId) -> CoreResult<Attachment> {
        self.store.run(TxMode::Read, |tx| {
            SqliteAttachmentRepository::new(tx)
                .get(id)?
                .ok_or_else(|| CoreError::not_found(EntityKind::Attachment, id))
        })
    }

    /// Attachments of one note in upload order.
    pub fn list_for_note(&self, note_id: NoteId) -> CoreResult<Vec<Attachment>> {
        self.store.run(TxMode::Read, |tx| -> CoreResult<Vec<Attachment>> {
            require_note(tx, note_id)?;
            SqliteAttachmentRepository::new(tx).list_for_note(note_id)
        })
    }

    fn check_batch(&self, note_id: NoteId, files: &[UploadFile]) -> CoreResult<()> {
        if files.is_empty() {
            return Err(ValidationError::Empty { field: "files" }.into());
        }
        if files.len() > self.limits.max_files {
            return Err(ValidationError::TooManyFiles {
                max_files: self.limits.max_files,
                actual: files.len(),
            }
            .into());
        }
        self.store
            .run(TxMode::Read, |tx| require_note(tx, note_id))
    }

    fn validate(&self, file: &UploadFile) -> CoreResult<String> {
        let extension = allowed_extension(&file.original_name)?;
        if file.bytes.is_empty() {
            return Err(ValidationError::EmptyFile(file.original_name.clone()).into());
        }
        let actual_bytes = file.bytes.len() as u64;
        if actual_bytes > self.limits.max_file_bytes {
            return Err(ValidationError::FileTooLarge {
                original_name: file.original_name.clone(),
                max_bytes: self.limits.max_file_bytes,
                actual_bytes,
            }
            .into());
        }
        Ok(extension)
    }

    fn upload_one(&self, note_id: NoteId, file: &UploadFile) -> CoreResult<Attachment> {
        let extension = self.validate(file)?;
        let storage_key = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.blobs.write(&storage_key, &file.bytes)?;
        let storage_path = path.to_string_lossy().into_owned();
        let original_name = file.original_name.trim();

        let inserted = self
            .store
            .run_with_timeout(TxMode::Write, self.db_wait, |tx| -> CoreResult<Attachment> {
                require_note(tx, note_id)?;
                SqliteAttachmentRepository::new(tx).insert(&NewAttachment {
                    storage_key: &storage_key,
                    original_name,
                    storage_path: &storage_path,
                    note_id,
                })
            });

        if let Err(err) = &inserted {
            warn!(
                "event=attachment_compensate module=attachment status=start key={} error_code={}",
                storage_key,
                err.kind().as_str()
            );
            match self.blobs.remove(&storage_key) {
                Ok(_) => info!(
                    "event=attachment_compensate module=attachment status=ok key={}",
                    storage_key
                ),
                Err(cleanup_err) => error!(
                    "event=attachment_compensate module=attachment status=error key={} error_code=orphan_blob error={}",
                    storage_key, cleanup_err
                ),
            }
        }
        inserted
    }
}

/// Removes the blob behind a deleted row. Never fails the caller.
pub(crate) fn remove_blob_best_effort<B: BlobStore + ?Sized>(blobs: &B, attachment: &Attachment) {
    match blobs.remove(&attachment.storage_key) {
        Ok(RemoveOutcome::Removed) => debug!(
            "event=blob_cleanup module=attachment status=ok attachment_id={}",
            attachment.id
        ),
        Ok(RemoveOutcome::Missing) => warn!(
            "event=blob_cleanup module=attachment status=error attachment_id={} error_code=blob_missing",
            attachment.id
        ),
        Err(err) => error!(
            "event=blob_cleanup module=attachment status=error attachment_id={} error_code=blob_remove_failed error={}",
            attachment.id, err
        ),
    }
}

fn require_note(conn: &Connection, note_id: NoteId) -> CoreResult<()> {
    SqliteNoteRepository::new(conn)
        .get(note_id)?
        .map(|_| ())
        .ok_or_else(|| CoreError::not_found(EntityKind::Note, note_id))
}
