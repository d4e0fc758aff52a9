//! Note repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist note rows and answer folder-scoped listings.
//! - Provide the `(title, folder)` lookup used by snapshot import.
//!
//! # Invariants
//! - Folder references are checked by services before writes; the schema
//!   foreign key is the backstop.
//! - `updated_at` is refreshed on every content update.

use crate::error::CoreResult;
use crate::model::folder::FolderId;
use crate::model::note::{Note, NoteId};
use rusqlite::{params, Connection, OptionalExtension, Row};

const NOTE_SELECT_SQL: &str =
    "SELECT id, title, content, folder_id, created_at, updated_at FROM notes";

/// Field set written by insert/update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub folder_id: Option<FolderId>,
}

/// Repository interface for note rows.
pub trait NoteRepository {
    fn get(&self, id: NoteId) -> CoreResult<Option<Note>>;
    /// Inserts one note. `timestamps` carries `(created_at, updated_at)` when
    /// replaying a snapshot; otherwise both default to now.
    fn insert(&self, draft: &NoteDraft<'_>, timestamps: Option<(i64, i64)>) -> CoreResult<Note>;
    /// Rewrites title, content and folder. Returns `false` when absent.
    fn update(&self, id: NoteId, draft: &NoteDraft<'_>) -> CoreResult<bool>;
    fn set_folder(&self, id: NoteId, folder_id: Option<FolderId>) -> CoreResult<bool>;
    fn delete(&self, id: NoteId) -> CoreResult<bool>;
    /// Notes filed in `folder_id` (`None` lists unfiled notes), title order.
    fn list_in_folder(&self, folder_id: Option<FolderId>) -> CoreResult<Vec<Note>>;
    fn list_all(&self) -> CoreResult<Vec<Note>>;
}

/// SQLite-backed note repository.
pub struct SqliteNoteRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteNoteRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn load(&self, id: NoteId) -> CoreResult<Note> {
        let note = self.conn.query_row(
            &format!("{NOTE_SELECT_SQL} WHERE id = ?1;"),
            [id],
            parse_note_row,
        )?;
        Ok(note)
    }
}

impl NoteRepository for SqliteNoteRepository<'_> {
    fn get(&self, id: NoteId) -> CoreResult<Option<Note>> {
        let note = self
            .conn
            .query_row(
                &format!("{NOTE_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_note_row,
            )
            .optional()?;
        Ok(note)
    }

    fn insert(&self, draft: &NoteDraft<'_>, timestamps: Option<(i64, i64)>) -> CoreResult<Note> {
        let (created_at, updated_at) = timestamps.unzip();
        self.conn.execute(
            "INSERT INTO notes (title, content, folder_id, created_at, updated_at)
             VALUES (
               ?1,
               ?2,
               ?3,
               COALESCE(?4, CAST(strftime('%s', 'now') AS INTEGER) * 1000),
               COALESCE(?5, CAST(strftime('%s', 'now') AS INTEGER) * 1000)
             );",
            params![
                draft.title,
                draft.content,
                draft.folder_id,
                created_at,
                updated_at
            ],
        )?;
        self.load(self.conn.last_insert_rowid())
    }

    fn update(&self, id: NoteId, draft: &NoteDraft<'_>) -> CoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE notes
             SET title = ?2,
                 content = ?3,
                 folder_id = ?4,
                 updated_at = (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
             WHERE id = ?1;",
            params![id, draft.title, draft.content, draft.folder_id],
        )?;
        Ok(changed > 0)
    }

    fn set_folder(&self, id: NoteId, folder_id: Option<FolderId>) -> CoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE notes
             SET folder_id = ?2,
                 updated_at = (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
             WHERE id = ?1;",
            params![id, folder_id],
        )?;
        Ok(changed > 0)
    }

    fn delete(&self, id: NoteId) -> CoreResult<bool> {
        let changed = self.conn.execute("DELETE FROM notes WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }

    fn list_in_folder(&self, folder_id: Option<FolderId>) -> CoreResult<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "{NOTE_SELECT_SQL} WHERE folder_id IS ?1 ORDER BY title ASC, id ASC;"
        ))?;
        let notes = stmt
            .query_map([folder_id], parse_note_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }

    fn list_all(&self) -> CoreResult<Vec<Note>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{NOTE_SELECT_SQL} ORDER BY id ASC;"))?;
        let notes = stmt
            .query_map([], parse_note_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notes)
    }
}

fn parse_note_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        folder_id: row.get("folder_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
