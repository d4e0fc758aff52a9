//! Attachment row persistence.
//!
//! # Responsibility
//! - Store and query the relational half of uploaded files.
//!
//! # Invariants
//! - Rows are only inserted after their blob exists on disk.
//! - Listing order is `uploaded_at ASC, id ASC`.

use crate::error::CoreResult;
use crate::model::attachment::{Attachment, AttachmentId};
use crate::model::note::NoteId;
use rusqlite::{params, Connection, OptionalExtension, Row};

const ATTACHMENT_SELECT_SQL: &str =
    "SELECT id, storage_key, original_name, storage_path, note_id, uploaded_at FROM attachments";

/// Field set for a new attachment row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment<'a> {
    pub storage_key: &'a str,
    pub original_name: &'a str,
    pub storage_path: &'a str,
    pub note_id: NoteId,
}

/// Repository interface for attachment rows.
pub trait AttachmentRepository {
    fn insert(&self, new: &NewAttachment<'_>) -> CoreResult<Attachment>;
    fn get(&self, id: AttachmentId) -> CoreResult<Option<Attachment>>;
    fn delete(&self, id: AttachmentId) -> CoreResult<bool>;
    fn list_for_note(&self, note_id: NoteId) -> CoreResult<Vec<Attachment>>;
    fn list_all(&self) -> CoreResult<Vec<Attachment>>;
    /// Removes every row owned by `note_id`, returning the removed rows.
    fn delete_for_note(&self, note_id: NoteId) -> CoreResult<Vec<Attachment>>;
}

/// SQLite-backed attachment repository.
pub struct SqliteAttachmentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAttachmentRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AttachmentRepository for SqliteAttachmentRepository<'_> {
    fn insert(&self, new: &NewAttachment<'_>) -> CoreResult<Attachment> {
        self.conn.execute(
            "INSERT INTO attachments (storage_key, original_name, storage_path, note_id)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                new.storage_key,
                new.original_name,
                new.storage_path,
                new.note_id
            ],
        )?;
        let attachment = self.conn.query_row(
            &format!("{ATTACHMENT_SELECT_SQL} WHERE id = ?1;"),
            [self.conn.last_insert_rowid()],
            parse_attachment_row,
        )?;
        Ok(attachment)
    }

    fn get(&self, id: AttachmentId) -> CoreResult<Option<Attachment>> {
        let attachment = self
            .conn
            .query_row(
                &format!("{ATTACHMENT_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_attachment_row,
            )
            .optional()?;
        Ok(attachment)
    }

    fn delete(&self, id: AttachmentId) -> CoreResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM attachments WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }

    fn list_for_note(&self, note_id: NoteId) -> CoreResult<Vec<Attachment>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ATTACHMENT_SELECT_SQL} WHERE note_id = ?1 ORDER BY uploaded_at ASC, id ASC;"
        ))?;
        let attachments = stmt
            .query_map([note_id], parse_attachment_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(attachments)
    }

    fn list_all(&self) -> CoreResult<Vec<Attachment>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ATTACHMENT_SELECT_SQL} ORDER BY id ASC;"))?;
        let attachments = stmt
            .query_map([], parse_attachment_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(attachments)
    }

    fn delete_for_note(&self, note_id: NoteId) -> CoreResult<Vec<Attachment>> {
        let removed = self.list_for_note(note_id)?;
        self.conn
            .execute("DELETE FROM attachments WHERE note_id = ?1;", params![note_id])?;
        Ok(removed)
    }
}

fn parse_attachment_row(row: &Row<'_>) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get("id")?,
        storage_key: row.get("storage_key")?,
        original_name: row.get("original_name")?,
        storage_path: row.get("storage_path")?,
        note_id: row.get("note_id")?,
        uploaded_at: row.get("uploaded_at")?,
    })
}
