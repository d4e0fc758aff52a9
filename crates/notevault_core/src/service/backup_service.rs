//! Backup export/import engine.
//!
//! # Responsibility
//! - Export the full folder/note/attachment graph as one JSON snapshot,
//!   optionally with copies of every attachment blob.
//! - Import snapshots with skip/overwrite policy and folder identity remapping.
//! - List, summarize, restore and delete stored exports.
//!
//! # Invariants
//! - Export reads every table inside one `Read` unit of work.
//! - Import applies the whole snapshot in one `Write` unit of work; any
//!   invalid record rolls the entire import back.
//! - Incoming folder ids are remapped to target ids before they are used as
//!   match keys or references.
//! - An export directory only becomes visible under its final name once fully
//!   written; dot-prefixed directories are never listed.

use crate::blob::BlobStore;
use crate::error::{CoreError, CoreResult, EntityKind, StorageError};
use crate::model::attachment::Attachment;
use crate::model::folder::{Folder, FolderId};
use crate::model::note::NoteId;
use crate::model::snapshot::{
    BackupRecord, BackupStats, ExportedBackup, ImportSummary, Snapshot, SnapshotData,
    SnapshotManifest, SNAPSHOT_SCHEMA_VERSION,
};
use crate::model::validation::{
    normalize_folder_name, normalize_note_title, validate_backup_name, validate_note_content,
    ValidationError,
};
use crate::repo::attachment_repo::{
    AttachmentRepository, NewAttachment, SqliteAttachmentRepository,
};
use crate::repo::folder_repo::{FolderRepository, SqliteFolderRepository};
use crate::repo::note_repo::{NoteDraft, NoteRepository, SqliteNoteRepository};
use crate::service::log_outcome;
use crate::store::{Store, TxMode};
use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Subdirectory of an export holding blob copies.
pub const ATTACHMENTS_DIR_NAME: &str = "attachments";

const STAGING_PREFIX: &str = ".staging-";
const TRASH_PREFIX: &str = ".trash-";

/// Backup/restore engine over one export root.
pub struct BackupService<B: BlobStore> {
    store: Arc<Store>,
    blobs: Arc<B>,
    export_root: PathBuf,
}

/// Blobs copied in by a restore, keyed by the source export.
struct RestoreSource<'a> {
    attachments_dir: &'a Path,
    attachments: &'a [Attachment],
    copied_keys: Vec<String>,
}

impl<B: BlobStore> BackupService<B> {
    pub fn new(store: Arc<Store>, blobs: Arc<B>, export_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            blobs,
            export_root: export_root.into(),
        }
    }

    pub fn export_root(&self) -> &Path {
        &self.export_root
    }

    /// Writes a new export and returns its record plus the snapshot written.
    pub fn export(&self, include_attachments: bool) -> CoreResult<ExportedBackup> {
        let started_at = Instant::now();
        let result = self
            .read_snapshot(include_attachments)
            .and_then(|snapshot| self.write_export(snapshot));
        log_outcome("backup_export", "backup", started_at, result)
    }

    /// Applies `snapshot` to the store.
    pub fn import(&self, snapshot: &Snapshot, overwrite: bool) -> CoreResult<ImportSummary> {
        let started_at = Instant::now();
        let result = check_version(&snapshot.metadata.version)
            .map_err(CoreError::from)
            .and_then(|()| {
                self.store.run(TxMode::Write, |tx| {
                    apply_snapshot(tx, &snapshot.data, overwrite)
                })
            });
        log_outcome("backup_import", "backup", started_at, result)
    }

    /// Applies a snapshot document received as untyped JSON.
    ///
    /// Only `data.folders` and `data.notes` are required; `metadata` is
    /// checked when present.
    pub fn import_json(&self, document: &Value, overwrite: bool) -> CoreResult<ImportSummary> {
        let started_at = Instant::now();
        let result = decode_snapshot_data(document).and_then(|data| {
            self.store
                .run(TxMode::Write, |tx| apply_snapshot(tx, &data, overwrite))
        });
        log_outcome("backup_import", "backup", started_at, result)
    }

    /// Reads a stored export back.
    pub fn load_snapshot(&self, name: &str) -> CoreResult<Snapshot> {
        let (_, document_path) = self.locate(name)?;
        read_snapshot_file(&document_path)
    }

    /// Imports a stored export and restores the blobs of newly inserted notes
    /// from its `attachments/` copy.
    pub fn restore(&self, name: &str, overwrite: bool) -> CoreResult<ImportSummary> {
        let started_at = Instant::now();
        let result = self.restore_inner(name, overwrite);
        log_outcome("backup_restore", "backup", started_at, result)
    }

    /// Stored exports, newest first.
    pub fn history(&self) -> CoreResult<Vec<BackupRecord>> {
        let entries = match fs::read_dir(&self.export_root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::io("read_dir", &self.export_root, err).into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StorageError::io("read_dir", &self.export_root, err))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            match self.load_record(&name) {
                Ok(record) => records.push(record),
                Err(err) => warn!(
                    "event=backup_history module=backup status=error backup={} error_code={} error={}",
                    name,
                    err.kind().as_str(),
                    err
                ),
            }
        }
        records.sort_by(|left, right| {
            right
                .manifest
                .exported_at
                .cmp(&left.manifest.exported_at)
                .then_with(|| left.name.cmp(&right.name))
        });
        Ok(records)
    }

    /// Aggregate count, size and age range over stored exports.
    pub fn stats(&self) -> CoreResult<BackupStats> {
        Ok(summarize(&self.history()?))
    }

    /// Removes one export directory.
    pub fn delete_backup(&self, name: &str) -> CoreResult<()> {
        let started_at = Instant::now();
        let result = self.delete_inner(name);
        log_outcome("backup_delete", "backup", started_at, result)
    }

    fn read_snapshot(&self, include_attachments: bool) -> CoreResult<Snapshot> {
        self.store.run(TxMode::Read, |tx| -> CoreResult<Snapshot> {
            let mut folders = SqliteFolderRepository::new(tx).list_all()?;
            folders.sort_by_key(|folder| folder.id);
            let notes = SqliteNoteRepository::new(tx).list_all()?;
            let attachments = SqliteAttachmentRepository::new(tx).list_all()?;

            let metadata = SnapshotManifest {
                version: SNAPSHOT_SCHEMA_VERSION.to_string(),
                exported_at: Utc::now(),
                include_attachments,
                total_folders: folders.len() as u64,
                total_notes: notes.len() as u64,
                total_attachments: attachments.len() as u64,
            };
            Ok(Snapshot {
                metadata,
                data: SnapshotData {
                    folders,
                    notes,
                    attachments: if include_attachments {
                        attachments
                    } else {
                        Vec::new()
                    },
                },
            })
        })
    }

    fn write_export(&self, snapshot: Snapshot) -> CoreResult<ExportedBackup> {
        fs::create_dir_all(&self.export_root)
            .map_err(|err| StorageError::io("create_dir", &self.export_root, err))?;

        let name = Uuid::new_v4().to_string();
        let staging_dir = self.export_root.join(format!("{STAGING_PREFIX}{name}"));
        let final_dir = self.export_root.join(&name);
        let file_name = backup_file_name(snapshot.metadata.exported_at);

        if let Err(err) = self.stage_export(&staging_dir, &file_name, &snapshot) {
            if let Err(cleanup_err) = fs::remove_dir_all(&staging_dir) {
                warn!(
                    "event=backup_export module=backup status=error error_code=staging_cleanup_failed path={} error={}",
                    staging_dir.display(),
                    cleanup_err
                );
            }
            return Err(err);
        }
        fs::rename(&staging_dir, &final_dir)
            .map_err(|err| StorageError::io("rename", &staging_dir, err))?;

        let record = BackupRecord {
            path: final_dir.join(&file_name),
            size_bytes: dir_size(&final_dir)?,
            name,
            file_name,
            manifest: snapshot.metadata.clone(),
        };
        info!(
            "event=backup_export module=backup status=ok backup={} folders={} notes={} attachments={} include_attachments={}",
            record.name,
            record.manifest.total_folders,
            record.manifest.total_notes,
            record.manifest.total_attachments,
            record.manifest.include_attachments
        );
        Ok(ExportedBackup { record, snapshot })
    }

    fn stage_export(&self, dir: &Path, file_name: &str, snapshot: &Snapshot) -> CoreResult<()> {
        fs::create_dir(dir).map_err(|err| StorageError::io("create_dir", dir, err))?;

        let document_path = dir.join(file_name);
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|source| StorageError::Json {
            path: document_path.clone(),
            source,
        })?;
        fs::write(&document_path, bytes)
            .map_err(|err| StorageError::io("write", &document_path, err))?;

        if !snapshot.metadata.include_attachments {
            return Ok(());
        }
        let attachments_dir = dir.join(ATTACHMENTS_DIR_NAME);
        fs::create_dir(&attachments_dir)
            .map_err(|err| StorageError::io("create_dir", &attachments_dir, err))?;
        for attachment in &snapshot.data.attachments {
            let destination = attachments_dir.join(&attachment.storage_key);
            if let Err(err) = self
                .blobs
                .export_file(&attachment.storage_key, &destination)
            {
                warn!(
                    "event=backup_export_blob module=backup status=error attachment_id={} error={}",
                    attachment.id, err
                );
            }
        }
        Ok(())
    }

    fn restore_inner(&self, name: &str, overwrite: bool) -> CoreResult<ImportSummary> {
        let (dir, document_path) = self.locate(name)?;
        let snapshot = read_snapshot_file(&document_path)?;
        check_version(&snapshot.metadata.version)?;

        let attachments_dir = dir.join(ATTACHMENTS_DIR_NAME);
        let mut source = RestoreSource {
            attachments_dir: &attachments_dir,
            attachments: &snapshot.data.attachments,
            copied_keys: Vec::new(),
        };
        let result = self.store.run(TxMode::Write, |tx| {
            apply_snapshot_with_blobs(
                tx,
                &snapshot.data,
                overwrite,
                self.blobs.as_ref(),
                &mut source,
            )
        });

        if result.is_err() {
            for key in &source.copied_keys {
                if let Err(err) = self.blobs.remove(key) {
                    warn!(
                        "event=backup_restore_compensate module=backup status=error key={} error_code=orphan_blob error={}",
                        key, err
                    );
                }
            }
        }
        result
    }

    fn delete_inner(&self, name: &str) -> CoreResult<()> {
        validate_backup_name(name)?;
        let dir = self.export_root.join(name);
        if !dir.is_dir() {
            return Err(CoreError::not_found(EntityKind::Backup, name));
        }
        let trash = self
            .export_root
            .join(format!("{TRASH_PREFIX}{}", Uuid::new_v4()));
        fs::rename(&dir, &trash).map_err(|err| StorageError::io("rename", &dir, err))?;
        if let Err(err) = fs::remove_dir_all(&trash) {
            warn!(
                "event=backup_delete module=backup status=error error_code=trash_cleanup_failed path={} error={}",
                trash.display(),
                err
            );
        }
        Ok(())
    }

    /// Resolves an export name to its directory and snapshot document.
    fn locate(&self, name: &str) -> CoreResult<(PathBuf, PathBuf)> {
        validate_backup_name(name)?;
        let dir = self.export_root.join(name);
        if !dir.is_dir() {
            return Err(CoreError::not_found(EntityKind::Backup, name));
        }
        let mut documents = fs::read_dir(&dir)
            .map_err(|err| StorageError::io("read_dir", &dir, err))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("json")
            })
            .collect::<Vec<_>>();
        documents.sort();
        let document = documents
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::not_found(EntityKind::Backup, name))?;
        Ok((dir, document))
    }

    fn load_record(&self, name: &str) -> CoreResult<BackupRecord> {
        let (dir, path) = self.locate(name)?;
        let snapshot = read_snapshot_file(&path)?;
        let file_name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or_default()
            .to_string();
        Ok(BackupRecord {
            name: name.to_string(),
            file_name,
            size_bytes: dir_size(&dir)?,
            path,
            manifest: snapshot.metadata,
        })
    }
}

/// Folder and note outcome of one import pass.
struct AppliedSnapshot {
    summary: ImportSummary,
    /// Snapshot note id to target note id, for notes inserted by this pass.
    inserted_notes: HashMap<NoteId, NoteId>,
}

fn apply_snapshot(
    conn: &Connection,
    data: &SnapshotData,
    overwrite: bool,
) -> CoreResult<ImportSummary> {
    apply_records(conn, data, overwrite).map(|applied| applied.summary)
}

fn apply_snapshot_with_blobs<B: BlobStore + ?Sized>(
    conn: &Connection,
    data: &SnapshotData,
    overwrite: bool,
    blobs: &B,
    source: &mut RestoreSource<'_>,
) -> CoreResult<ImportSummary> {
    let applied = apply_records(conn, data, overwrite)?;
    let mut summary = applied.summary;
    let repo = SqliteAttachmentRepository::new(conn);

    for attachment in source.attachments {
        let Some(&note_id) = applied.inserted_notes.get(&attachment.note_id) else {
            continue;
        };
        let Some(file_name) = plain_file_name(&attachment.storage_key) else {
            warn!(
                "event=backup_restore_blob module=backup status=error attachment_id={} error_code=unsafe_key",
                attachment.id
            );
            continue;
        };
        let copy = source.attachments_dir.join(file_name);
        if !copy.is_file() {
            warn!(
                "event=backup_restore_blob module=backup status=error attachment_id={} error_code=blob_missing",
                attachment.id
            );
            continue;
        }

        let storage_key = match Path::new(file_name).extension().and_then(|ext| ext.to_str()) {
            Some(extension) => format!("{}.{}", Uuid::new_v4(), extension.to_ascii_lowercase()),
            None => Uuid::new_v4().to_string(),
        };
        let path = match blobs.import_file(&copy, &storage_key) {
            Ok(path) => path,
            Err(err) => {
                warn!(
                    "event=backup_restore_blob module=backup status=error attachment_id={} error_code=copy_failed error={}",
                    attachment.id, err
                );
                continue;
            }
        };
        source.copied_keys.push(storage_key.clone());
        repo.insert(&NewAttachment {
            storage_key: &storage_key,
            original_name: &attachment.original_name,
            storage_path: &path.to_string_lossy(),
            note_id,
        })?;
        summary.attachments_restored += 1;
    }
    Ok(summary)
}

/// Folder pass then note pass, with identity remapping.
fn apply_records(
    conn: &Connection,
    data: &SnapshotData,
    overwrite: bool,
) -> CoreResult<AppliedSnapshot> {
    let folders = SqliteFolderRepository::new(conn);
    let notes = SqliteNoteRepository::new(conn);
    let mut summary = ImportSummary::default();

    let folder_map = apply_folders(&folders, &data.folders, overwrite, &mut summary)?;

    // Each pre-existing note can absorb at most one incoming note; rows
    // inserted by this pass are never match candidates.
    let mut existing: HashMap<(String, Option<FolderId>), VecDeque<NoteId>> = HashMap::new();
    for note in notes.list_all()? {
        existing
            .entry((note.title, note.folder_id))
            .or_default()
            .push_back(note.id);
    }

    let mut inserted_notes = HashMap::new();
    for note in &data.notes {
        let title = normalize_note_title(&note.title)
            .and_then(|title| validate_note_content(&note.content).map(|()| title))
            .map_err(|err| malformed(format!("note {}: {err}", note.id)))?;
        let folder_id = match note.folder_id {
            None => None,
            Some(old_id) => Some(*folder_map.get(&old_id).ok_or_else(|| {
                malformed(format!("note {} references unknown folder {old_id}", note.id))
            })?),
        };
        let draft = NoteDraft {
            title: &title,
            content: &note.content,
            folder_id,
        };

        let matched = existing
            .get_mut(&(title.clone(), folder_id))
            .and_then(VecDeque::pop_front);
        match matched {
            Some(_) if !overwrite => summary.skipped_count += 1,
            Some(existing_id) => {
                notes.update(existing_id, &draft)?;
                summary.imported_count += 1;
            }
            None => {
                let inserted = notes.insert(&draft, Some((note.created_at, note.updated_at)))?;
                if inserted_notes.insert(note.id, inserted.id).is_some() {
                    return Err(malformed(format!("duplicate note id {}", note.id)));
                }
                summary.imported_count += 1;
            }
        }
    }

    Ok(AppliedSnapshot {
        summary,
        inserted_notes,
    })
}

/// Applies incoming folders parent-first and returns the old-to-new id map.
///
/// The parent-less snapshot folder maps onto the target Root.
fn apply_folders<R: FolderRepository>(
    repo: &R,
    incoming: &[Folder],
    overwrite: bool,
    summary: &mut ImportSummary,
) -> CoreResult<HashMap<FolderId, FolderId>> {
    let mut children: HashMap<Option<FolderId>, Vec<&Folder>> = HashMap::new();
    for folder in incoming {
        children.entry(folder.parent_id).or_default().push(folder);
    }

    let mut map = HashMap::new();
    let mut queue = VecDeque::new();
    match children.remove(&None).as_deref() {
        None | Some([]) => {}
        Some([snapshot_root]) => {
            let name = normalize_folder_name(&snapshot_root.name)
                .map_err(|err| malformed(format!("folder {}: {err}", snapshot_root.id)))?;
            let root = repo
                .root()?
                .ok_or_else(|| CoreError::not_found(EntityKind::Folder, "root"))?;
            if overwrite {
                repo.update(root.id, &name, None)?;
                summary.imported_count += 1;
            } else {
                summary.skipped_count += 1;
            }
            map.insert(snapshot_root.id, root.id);
            queue.push_back(snapshot_root.id);
        }
        Some(_) => return Err(malformed("more than one parent-less folder".to_string())),
    }

    while let Some(old_parent_id) = queue.pop_front() {
        let Some(batch) = children.remove(&Some(old_parent_id)) else {
            continue;
        };
        let new_parent_id = map[&old_parent_id];
        for folder in batch {
            let name = normalize_folder_name(&folder.name)
                .map_err(|err| malformed(format!("folder {}: {err}", folder.id)))?;
            let target_id = match repo.find_child_by_name(Some(new_parent_id), &name, None)? {
                Some(existing_id) if !overwrite => {
                    summary.skipped_count += 1;
                    existing_id
                }
                Some(existing_id) => {
                    repo.update(existing_id, &name, Some(new_parent_id))?;
                    summary.imported_count += 1;
                    existing_id
                }
                None => {
                    let inserted =
                        repo.insert(&name, Some(new_parent_id), Some(folder.created_at))?;
                    summary.imported_count += 1;
                    inserted.id
                }
            };
            if map.insert(folder.id, target_id).is_some() {
                return Err(malformed(format!("duplicate folder id {}", folder.id)));
            }
            queue.push_back(folder.id);
        }
    }

    // Anything left is detached from the snapshot root or part of a cycle.
    if let Some(folder) = children.values().flatten().next() {
        return Err(malformed(format!(
            "folder {} references unknown parent {}",
            folder.id,
            folder.parent_id.unwrap_or_default()
        )));
    }
    Ok(map)
}

fn decode_snapshot_data(document: &Value) -> CoreResult<SnapshotData> {
    let data = document
        .get("data")
        .filter(|data| {
            data.get("folders").is_some_and(Value::is_array)
                && data.get("notes").is_some_and(Value::is_array)
        })
        .ok_or_else(|| malformed("backup data must contain folders and notes arrays".to_string()))?;
    if let Some(version) = document
        .get("metadata")
        .and_then(|metadata| metadata.get("version"))
        .and_then(Value::as_str)
    {
        check_version(version)?;
    }
    SnapshotData::deserialize(data).map_err(|err| malformed(err.to_string()))
}

fn read_snapshot_file(path: &Path) -> CoreResult<Snapshot> {
    let bytes = fs::read(path).map_err(|err| StorageError::io("read", path, err))?;
    serde_json::from_slice(&bytes).map_err(|source| {
        StorageError::Json {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

fn check_version(version: &str) -> Result<(), ValidationError> {
    let supported = SNAPSHOT_SCHEMA_VERSION.split('.').next();
    if version.split('.').next() != supported {
        return Err(ValidationError::MalformedSnapshot(format!(
            "unsupported snapshot version `{version}`"
        )));
    }
    Ok(())
}

fn malformed(details: String) -> CoreError {
    ValidationError::MalformedSnapshot(details).into()
}

fn plain_file_name(key: &str) -> Option<&str> {
    let name = Path::new(key).file_name()?.to_str()?;
    (name == key).then_some(name)
}

fn backup_file_name(exported_at: DateTime<Utc>) -> String {
    format!("backup-{}.json", exported_at.format("%Y-%m-%dT%H-%M-%S-%3fZ"))
}

fn summarize(records: &[BackupRecord]) -> BackupStats {
    let total_backups = records.len() as u64;
    let total_size = records.iter().map(|record| record.size_bytes).sum();
    BackupStats {
        total_backups,
        total_size,
        oldest_backup: records.iter().map(|record| record.manifest.exported_at).min(),
        newest_backup: records.iter().map(|record| record.manifest.exported_at).max(),
        average_size: if total_backups == 0 {
            0
        } else {
            total_size / total_backups
        },
    }
}

fn dir_size(path: &Path) -> CoreResult<u64> {
    let mut total = 0;
    let entries = fs::read_dir(path).map_err(|err| StorageError::io("read_dir", path, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| StorageError::io("read_dir", path, err))?;
        let metadata = entry
            .metadata()
            .map_err(|err| StorageError::io("stat", entry.path(), err))?;
        total += if metadata.is_dir() {
            dir_size(&entry.path())?
        } else {
            metadata.len()
        };
    }
    Ok(total)
}
