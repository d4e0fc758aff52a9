//! Folder hierarchy use-case service.
//!
//! # Responsibility
//! - Validate tree invariants above the repository layer.
//! - Provide folder create, rename, move, delete and read operations.
//!
//! # Invariants
//! - Every check and the write it guards run inside one `Write` unit of work,
//!   so no other mutation can interleave between them.
//! - Root is never deleted or reparented.
//! - A move never places a folder under itself or one of its descendants.
//! - Names are unique among siblings.

use crate::error::{CoreError, CoreResult, EntityKind, StructuralViolation};
use crate::model::folder::{Folder, FolderId, FolderStats, FolderTreeNode, ROOT_FOLDER_ID};
use crate::model::validation::normalize_folder_name;
use crate::repo::folder_repo::{FolderRepository, SqliteFolderRepository};
use crate::service::log_outcome;
use crate::store::{Store, TxMode};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Upper bound for ancestor walks. Deeper chains mean corrupt parent links.
pub const MAX_TREE_DEPTH: usize = 4096;

/// Folder hierarchy manager.
pub struct FolderService {
    store: Arc<Store>,
}

impl FolderService {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Creates one folder. `parent_id = None` files it under Root.
    pub fn create(&self, name: &str, parent_id: Option<FolderId>) -> CoreResult<Folder> {
        let started_at = Instant::now();
        let result = normalize_folder_name(name)
            .map_err(CoreError::from)
            .and_then(|name| {
                self.store.run(TxMode::Write, |tx| -> CoreResult<Folder> {
                    let repo = SqliteFolderRepository::new(tx);
                    let parent_id = parent_id.unwrap_or(ROOT_FOLDER_ID);
                    require_folder(&repo, parent_id)?;
                    ensure_unique_sibling(&repo, parent_id, &name, None)?;
                    repo.insert(&name, Some(parent_id), None)
                })
            });
        log_outcome("folder_create", "folder", started_at, result)
    }

    /// Renames one folder. Uniqueness ignores the folder itself.
    pub fn rename(&self, id: FolderId, new_name: &str) -> CoreResult<Folder> {
        let started_at = Instant::now();
        let result = normalize_folder_name(new_name)
            .map_err(CoreError::from)
            .and_then(|name| {
                self.store.run(TxMode::Write, |tx| -> CoreResult<Folder> {
                    let repo = SqliteFolderRepository::new(tx);
                    let mut folder = require_folder(&repo, id)?;
                    if folder.name == name {
                        return Ok(folder);
                    }
                    if let Some(parent_id) = folder.parent_id {
                        ensure_unique_sibling(&repo, parent_id, &name, Some(id))?;
                    }
                    repo.update(id, &name, folder.parent_id)?;
                    folder.name = name;
                    Ok(folder)
                })
            });
        log_outcome("folder_rename", "folder", started_at, result)
    }

    /// Reparents one folder under `new_parent_id`.
    pub fn move_to(&self, id: FolderId, new_parent_id: FolderId) -> CoreResult<Folder> {
        let started_at = Instant::now();
        let result = self.store.run(TxMode::Write, |tx| -> CoreResult<Folder> {
            let repo = SqliteFolderRepository::new(tx);
            let mut folder = require_folder(&repo, id)?;
            if folder.is_root() {
                return Err(StructuralViolation::RootImmutable { operation: "moved" }.into());
            }
            if id == new_parent_id {
                return Err(StructuralViolation::SelfParent(id).into());
            }
            require_folder(&repo, new_parent_id)?;
            if would_create_cycle(&repo, id, new_parent_id)? {
                return Err(StructuralViolation::Cycle {
                    folder_id: id,
                    new_parent_id,
                }
                .into());
            }
            if folder.parent_id == Some(new_parent_id) {
                return Ok(folder);
            }
            ensure_unique_sibling(&repo, new_parent_id, &folder.name, Some(id))?;
            repo.update(id, &folder.name, Some(new_parent_id))?;
            folder.parent_id = Some(new_parent_id);
            Ok(folder)
        });
        log_outcome("folder_move", "folder", started_at, result)
    }

    /// Deletes an empty, non-root folder.
    pub fn delete(&self, id: FolderId) -> CoreResult<()> {
        let started_at = Instant::now();
        let result = self.store.run(TxMode::Write, |tx| -> CoreResult<()> {
            let repo = SqliteFolderRepository::new(tx);
            let folder = require_folder(&repo, id)?;
            if folder.is_root() {
                return Err(StructuralViolation::RootImmutable {
                    operation: "deleted",
                }
                .into());
            }
            let subfolders = repo.count_children(id)?;
            let notes = repo.count_notes(id)?;
            if subfolders > 0 || notes > 0 {
                return Err(StructuralViolation::FolderNotEmpty {
                    folder_id: id,
                    subfolders,
                    notes,
                }
                .into());
            }
            repo.delete(id)?;
            Ok(())
        });
        log_outcome("folder_delete", "folder", started_at, result)
    }

    /// Direct child counts for one folder.
    pub fn stats(&self, id: FolderId) -> CoreResult<FolderStats> {
        self.store.run(TxMode::Read, |tx| -> CoreResult<FolderStats> {
            let repo = SqliteFolderRepository::new(tx);
            require_folder(&repo, id)?;
            Ok(FolderStats {
                subfolders: repo.count_children(id)?,
                notes: repo.count_notes(id)?,
                attachments: repo.count_attachments(id)?,
            })
        })
    }

    pub fn get(&self, id: FolderId) -> CoreResult<Folder> {
        self.store.run(TxMode::Read, |tx| {
            require_folder(&SqliteFolderRepository::new(tx), id)
        })
    }

    pub fn root(&self) -> CoreResult<Folder> {
        self.store.run(TxMode::Read, |tx| {
            SqliteFolderRepository::new(tx)
                .root()?
                .ok_or_else(|| CoreError::not_found(EntityKind::Folder, ROOT_FOLDER_ID))
        })
    }

    /// Flat listing ordered by name, then id.
    pub fn list_all(&self) -> CoreResult<Vec<Folder>> {
        self.store
            .run(TxMode::Read, |tx| SqliteFolderRepository::new(tx).list_all())
    }

    /// Nested view rooted at Root, built from one consistent read.
    pub fn tree(&self) -> CoreResult<FolderTreeNode> {
        let folders = self.list_all()?;
        build_tree(folders)
    }
}

/// Loads a folder or fails with `NotFound`.
pub(crate) fn require_folder<R: FolderRepository>(repo: &R, id: FolderId) -> CoreResult<Folder> {
    repo.get(id)?
        .ok_or_else(|| CoreError::not_found(EntityKind::Folder, id))
}

fn ensure_unique_sibling<R: FolderRepository>(
    repo: &R,
    parent_id: FolderId,
    name: &str,
    exclude: Option<FolderId>,
) -> CoreResult<()> {
    if repo
        .find_child_by_name(Some(parent_id), name, exclude)?
        .is_some()
    {
        return Err(CoreError::Conflict(format!(
            "a folder named `{name}` already exists in folder {parent_id}"
        )));
    }
    Ok(())
}

/// Walks the ancestors of `candidate_parent_id`; reaching `folder_id` means
/// the move would put the folder inside its own subtree.
fn would_create_cycle<R: FolderRepository>(
    repo: &R,
    folder_id: FolderId,
    candidate_parent_id: FolderId,
) -> CoreResult<bool> {
    let mut visited = HashSet::new();
    let mut cursor = Some(candidate_parent_id);
    while let Some(current) = cursor {
        if current == folder_id || !visited.insert(current) {
            return Ok(true);
        }
        if visited.len() > MAX_TREE_DEPTH {
            return Err(StructuralViolation::DepthLimitExceeded(candidate_parent_id).into());
        }
        cursor = require_folder(repo, current)?.parent_id;
    }
    Ok(false)
}

fn build_tree(folders: Vec<Folder>) -> CoreResult<FolderTreeNode> {
    let mut root = None;
    let mut children: HashMap<FolderId, Vec<Folder>> = HashMap::new();
    for folder in folders {
        match folder.parent_id {
            None => root = Some(folder),
            Some(parent_id) => children.entry(parent_id).or_default().push(folder),
        }
    }
    let root = root.ok_or_else(|| CoreError::not_found(EntityKind::Folder, ROOT_FOLDER_ID))?;
    Ok(attach_children(root, &mut children, 0))
}

fn attach_children(
    folder: Folder,
    children: &mut HashMap<FolderId, Vec<Folder>>,
    depth: usize,
) -> FolderTreeNode {
    let direct = if depth < MAX_TREE_DEPTH {
        children.remove(&folder.id).unwrap_or_default()
    } else {
        Vec::new()
    };
    FolderTreeNode {
        children: direct
            .into_iter()
            .map(|child| attach_children(child, children, depth + 1))
            .collect(),
        folder,
    }
}
