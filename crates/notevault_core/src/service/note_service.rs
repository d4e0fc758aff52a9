//! Note use-case service.
//!
//! # Responsibility
//! - Validate note input and folder references before persistence.
//! - Delete notes together with their attachments.
//!
//! # Invariants
//! - A stored note's folder reference always resolves (or is unfiled).
//! - Note delete removes attachment rows and the note row in one unit of
//!   work; blob cleanup runs only after that commit.

use crate::blob::BlobStore;
use crate::error::{CoreError, CoreResult, EntityKind};
use crate::model::folder::FolderId;
use crate::model::note::{Note, NoteId};
use crate::model::validation::{normalize_note_title, validate_note_content};
use crate::repo::attachment_repo::{AttachmentRepository, SqliteAttachmentRepository};
use crate::repo::folder_repo::SqliteFolderRepository;
use crate::repo::note_repo::{NoteDraft, NoteRepository, SqliteNoteRepository};
use crate::service::attachment_service::remove_blob_best_effort;
use crate::service::folder_service::require_folder;
use crate::service::log_outcome;
use crate::store::{Store, TxMode};
use log::info;
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Instant;

/// Note manager.
pub struct NoteService<B: BlobStore> {
    store: Arc<Store>,
    blobs: Arc<B>,
}

impl<B: BlobStore> NoteService<B> {
    pub fn new(store: Arc<Store>, blobs: Arc<B>) -> Self {
        Self { store, blobs }
    }

    /// Creates one note, optionally filed into `folder_id`.
    pub fn create(
        &self,
        title: &str,
        content: &str,
        folder_id: Option<FolderId>,
    ) -> CoreResult<Note> {
        let started_at = Instant::now();
        let result = validated_title(title, content).and_then(|title| {
            self.store.run(TxMode::Write, |tx| -> CoreResult<Note> {
                ensure_folder_ref(tx, folder_id)?;
                SqliteNoteRepository::new(tx).insert(
                    &NoteDraft {
                        title: &title,
                        content,
                        folder_id,
                    },
                    None,
                )
            })
        });
        log_outcome("note_create", "note", started_at, result)
    }

    /// Replaces title, content and folder of one note.
    pub fn update(
        &self,
        id: NoteId,
        title: &str,
        content: &str,
        folder_id: Option<FolderId>,
    ) -> CoreResult<Note> {
        let started_at = Instant::now();
        let result = validated_title(title, content).and_then(|title| {
            self.store.run(TxMode::Write, |tx| -> CoreResult<Note> {
                let repo = SqliteNoteRepository::new(tx);
                require_note(&repo, id)?;
                ensure_folder_ref(tx, folder_id)?;
                repo.update(
                    id,
                    &NoteDraft {
                        title: &title,
                        content,
                        folder_id,
                    },
                )?;
                require_note(&repo, id)
            })
        });
        log_outcome("note_update", "note", started_at, result)
    }

    /// Files one note into `folder_id` (`None` unfiles it).
    pub fn move_to(&self, id: NoteId, folder_id: Option<FolderId>) -> CoreResult<Note> {
        let started_at = Instant::now();
        let result = self.store.run(TxMode::Write, |tx| -> CoreResult<Note> {
            let repo = SqliteNoteRepository::new(tx);
            require_note(&repo, id)?;
            ensure_folder_ref(tx, folder_id)?;
            repo.set_folder(id, folder_id)?;
            require_note(&repo, id)
        });
        log_outcome("note_move", "note", started_at, result)
    }

    pub fn get(&self, id: NoteId) -> CoreResult<Note> {
        self.store.run(TxMode::Read, |tx| {
            require_note(&SqliteNoteRepository::new(tx), id)
        })
    }

    /// Notes in one folder (`None` lists unfiled notes), ordered by title.
    pub fn list_in_folder(&self, folder_id: Option<FolderId>) -> CoreResult<Vec<Note>> {
        self.store.run(TxMode::Read, |tx| -> CoreResult<Vec<Note>> {
            ensure_folder_ref(tx, folder_id)?;
            SqliteNoteRepository::new(tx).list_in_folder(folder_id)
        })
    }

    /// Deletes one note and its attachments.
    pub fn delete(&self, id: NoteId) -> CoreResult<()> {
        let started_at = Instant::now();
        let result = self.store.run(TxMode::Write, |tx| {
            let notes = SqliteNoteRepository::new(tx);
            require_note(&notes, id)?;
            let removed = SqliteAttachmentRepository::new(tx).delete_for_note(id)?;
            notes.delete(id)?;
            Ok::<_, CoreError>(removed)
        });
        let result = result.map(|removed| {
            for attachment in &removed {
                remove_blob_best_effort(self.blobs.as_ref(), attachment);
            }
            info!(
                "event=note_delete_blobs module=note status=ok note_id={} attachments={}",
                id,
                removed.len()
            );
        });
        log_outcome("note_delete", "note", started_at, result)
    }
}

fn validated_title(title: &str, content: &str) -> CoreResult<String> {
    let title = normalize_note_title(title)?;
    validate_note_content(content)?;
    Ok(title)
}

fn require_note<R: NoteRepository>(repo: &R, id: NoteId) -> CoreResult<Note> {
    repo.get(id)?
        .ok_or_else(|| CoreError::not_found(EntityKind::Note, id))
}

fn ensure_folder_ref(conn: &Connection, folder_id: Option<FolderId>) -> CoreResult<()> {
    if let Some(folder_id) = folder_id {
        require_folder(&SqliteFolderRepository::new(conn), folder_id)?;
    }
    Ok(())
}
