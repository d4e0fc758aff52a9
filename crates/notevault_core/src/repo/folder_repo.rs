//! Folder repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide row-level persistence APIs for the folder tree.
//! - Keep SQL details and ordering behavior inside repository boundary.
//!
//! # Invariants
//! - Repositories never decide tree policy; services validate before writing.
//! - Sibling lookups compare names with SQLite's case-sensitive BINARY collation.
//! - Listing is deterministic: `name ASC, id ASC`.

use crate::error::CoreResult;
use crate::model::folder::{Folder, FolderId};
use rusqlite::{params, Connection, OptionalExtension, Row};

const FOLDER_SELECT_SQL: &str = "SELECT id, name, parent_id, created_at FROM folders";

/// Repository interface for folder rows.
pub trait FolderRepository {
    /// Loads one folder by id.
    fn get(&self, id: FolderId) -> CoreResult<Option<Folder>>;
    /// Loads the parent-less Root folder.
    fn root(&self) -> CoreResult<Option<Folder>>;
    /// Finds a sibling with exactly `name` under `parent_id`, ignoring `exclude`.
    fn find_child_by_name(
        &self,
        parent_id: Option<FolderId>,
        name: &str,
        exclude: Option<FolderId>,
    ) -> CoreResult<Option<FolderId>>;
    /// Inserts one folder; `created_at` defaults to now.
    fn insert(
        &self,
        name: &str,
        parent_id: Option<FolderId>,
        created_at: Option<i64>,
    ) -> CoreResult<Folder>;
    /// Rewrites name and parent of one folder. Returns `false` when absent.
    fn update(&self, id: FolderId, name: &str, parent_id: Option<FolderId>) -> CoreResult<bool>;
    /// Deletes one folder row. Returns `false` when absent.
    fn delete(&self, id: FolderId) -> CoreResult<bool>;
    /// Counts direct child folders.
    fn count_children(&self, id: FolderId) -> CoreResult<u64>;
    /// Counts notes filed directly in the folder.
    fn count_notes(&self, id: FolderId) -> CoreResult<u64>;
    /// Counts attachments of notes filed directly in the folder.
    fn count_attachments(&self, id: FolderId) -> CoreResult<u64>;
    /// Lists every folder.
    fn list_all(&self) -> CoreResult<Vec<Folder>>;
}

/// SQLite-backed folder repository.
///
/// Accepts a plain connection or a `Transaction` (via deref).
pub struct SqliteFolderRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFolderRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl FolderRepository for SqliteFolderRepository<'_> {
    fn get(&self, id: FolderId) -> CoreResult<Option<Folder>> {
        let folder = self
            .conn
            .query_row(
                &format!("{FOLDER_SELECT_SQL} WHERE id = ?1;"),
                [id],
                parse_folder_row,
            )
            .optional()?;
        Ok(folder)
    }

    fn root(&self) -> CoreResult<Option<Folder>> {
        let folder = self
            .conn
            .query_row(
                &format!("{FOLDER_SELECT_SQL} WHERE parent_id IS NULL;"),
                [],
                parse_folder_row,
            )
            .optional()?;
        Ok(folder)
    }

    fn find_child_by_name(
        &self,
        parent_id: Option<FolderId>,
        name: &str,
        exclude: Option<FolderId>,
    ) -> CoreResult<Option<FolderId>> {
        let id = self
            .conn
            .query_row(
                "SELECT id
                 FROM folders
                 WHERE name = ?1
                   AND parent_id IS ?2
                   AND (?3 IS NULL OR id <> ?3)
                 ORDER BY id ASC
                 LIMIT 1;",
                params![name, parent_id, exclude],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    fn insert(
        &self,
        name: &str,
        parent_id: Option<FolderId>,
        created_at: Option<i64>,
    ) -> CoreResult<Folder> {
        self.conn.execute(
            "INSERT INTO folders (name, parent_id, created_at)
             VALUES (?1, ?2, COALESCE(?3, CAST(strftime('%s', 'now') AS INTEGER) * 1000));",
            params![name, parent_id, created_at],
        )?;
        let id = self.conn.last_insert_rowid();
        let folder = self.conn.query_row(
            &format!("{FOLDER_SELECT_SQL} WHERE id = ?1;"),
            [id],
            parse_folder_row,
        )?;
        Ok(folder)
    }

    fn update(&self, id: FolderId, name: &str, parent_id: Option<FolderId>) -> CoreResult<bool> {
        let changed = self.conn.execute(
            "UPDATE folders SET name = ?2, parent_id = ?3 WHERE id = ?1;",
            params![id, name, parent_id],
        )?;
        Ok(changed > 0)
    }

    fn delete(&self, id: FolderId) -> CoreResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM folders WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }

    fn count_children(&self, id: FolderId) -> CoreResult<u64> {
        count(
            self.conn,
            "SELECT COUNT(*) FROM folders WHERE parent_id = ?1;",
            id,
        )
    }

    fn count_notes(&self, id: FolderId) -> CoreResult<u64> {
        count(
            self.conn,
            "SELECT COUNT(*) FROM notes WHERE folder_id = ?1;",
            id,
        )
    }

    fn count_attachments(&self, id: FolderId) -> CoreResult<u64> {
        count(
            self.conn,
            "SELECT COUNT(*)
             FROM attachments a
             INNER JOIN notes n ON a.note_id = n.id
             WHERE n.folder_id = ?1;",
            id,
        )
    }

    fn list_all(&self) -> CoreResult<Vec<Folder>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{FOLDER_SELECT_SQL} ORDER BY name ASC, id ASC;"))?;
        let folders = stmt
            .query_map([], parse_folder_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(folders)
    }
}

fn count(conn: &Connection, sql: &str, id: i64) -> CoreResult<u64> {
    let value: i64 = conn.query_row(sql, [id], |row| row.get(0))?;
    Ok(value.max(0) as u64)
}

fn parse_folder_row(row: &Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: row.get("id")?,
        name: row.get("name")?,
        parent_id: row.get("parent_id")?,
        created_at: row.get("created_at")?,
    })
}
