//! Typed error surface shared by every core service.
//!
//! # Responsibility
//! - Map low-level failures (SQLite, filesystem, lock timeouts) onto the
//!   caller-facing error kinds.
//! - Separate caller-safe messages from log-only detail.
//!
//! # Invariants
//! - `Validation`, `NotFound`, `Conflict` and `StructuralViolation` are raised
//!   before any side effect.
//! - `Storage` and `Transaction` detail is only exposed in debug mode.

use crate::blob::BlobError;
use crate::db::DbError;
use crate::model::folder::FolderId;
use crate::model::validation::ValidationError;
use crate::store::StoreError;
use serde::{Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub type CoreResult<T> = Result<T, CoreError>;

/// Caller-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    StructuralViolation,
    Storage,
    Transaction,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::StructuralViolation => "structural_violation",
            Self::Storage => "storage",
            Self::Transaction => "transaction",
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Entity referenced by a `NotFound` error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Folder,
    Note,
    Attachment,
    Backup,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Folder => "folder",
            Self::Note => "note",
            Self::Attachment => "attachment",
            Self::Backup => "backup",
        };
        f.write_str(label)
    }
}

/// Operation that would break a tree invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuralViolation {
    /// Root cannot be deleted or reparented.
    RootImmutable { operation: &'static str },
    /// A folder cannot become its own parent.
    SelfParent(FolderId),
    /// Target parent lies inside the moved folder's subtree.
    Cycle {
        folder_id: FolderId,
        new_parent_id: FolderId,
    },
    /// Delete refused because the folder still has content.
    FolderNotEmpty {
        folder_id: FolderId,
        subfolders: u64,
        notes: u64,
    },
    /// Ancestor walk exceeded the depth cap; persisted parent links are corrupt.
    DepthLimitExceeded(FolderId),
}

impl Display for StructuralViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RootImmutable { operation } => write!(f, "root folder cannot be {operation}"),
            Self::SelfParent(id) => write!(f, "folder {id} cannot be its own parent"),
            Self::Cycle {
                folder_id,
                new_parent_id,
            } => write!(
                f,
                "moving folder {folder_id} under {new_parent_id} would create a cycle"
            ),
            Self::FolderNotEmpty {
                folder_id,
                subfolders,
                notes,
            } => write!(
                f,
                "folder {folder_id} is not empty ({subfolders} subfolders, {notes} notes)"
            ),
            Self::DepthLimitExceeded(id) => {
                write!(f, "folder {id} exceeds the maximum tree depth")
            }
        }
    }
}

/// Filesystem-side failure outside the blob store itself.
#[derive(Debug)]
pub enum StorageError {
    Blob(BlobError),
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl StorageError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob(err) => write!(f, "{err}"),
            Self::Io { op, path, source } => {
                write!(f, "{op} failed for `{}`: {source}", path.display())
            }
            Self::Json { path, source } => {
                write!(f, "invalid JSON document `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Blob(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

/// Error returned by folder, note, attachment and backup operations.
#[derive(Debug)]
pub enum CoreError {
    Validation(ValidationError),
    NotFound { entity: EntityKind, id: String },
    /// Sibling name collision.
    Conflict(String),
    Structural(StructuralViolation),
    Storage(StorageError),
    Transaction(StoreError),
}

impl CoreError {
    pub fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Structural(_) => ErrorKind::StructuralViolation,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Transaction(_) => ErrorKind::Transaction,
        }
    }

    /// Message safe to return to an API caller.
    ///
    /// Storage and transaction failures are reported generically unless
    /// `debug` is set; the full error is expected to be logged by the caller.
    pub fn public_message(&self, debug: bool) -> String {
        match self {
            Self::Storage(_) if !debug => "storage operation failed".to_string(),
            Self::Transaction(_) if !debug => "database operation failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict(message) => write!(f, "{message}"),
            Self::Structural(violation) => write!(f, "{violation}"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Transaction(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Storage(err) => Some(err),
            Self::Transaction(err) => Some(err),
            Self::NotFound { .. } | Self::Conflict(_) | Self::Structural(_) => None,
        }
    }
}

impl From<ValidationError> for CoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StructuralViolation> for CoreError {
    fn from(value: StructuralViolation) -> Self {
        Self::Structural(value)
    }
}

impl From<StorageError> for CoreError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<BlobError> for CoreError {
    fn from(value: BlobError) -> Self {
        Self::Storage(StorageError::Blob(value))
    }
}

impl From<StoreError> for CoreError {
    fn from(value: StoreError) -> Self {
        Self::Transaction(value)
    }
}

impl From<DbError> for CoreError {
    fn from(value: DbError) -> Self {
        Self::Transaction(StoreError::Db(value))
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Transaction(StoreError::Db(DbError::Sqlite(value)))
    }
}
