//! Blob store for attachment payloads.
//!
//! # Responsibility
//! - Create, copy and delete blob files keyed by generated storage keys.
//! - Enforce the managed root boundary on every path it touches.
//!
//! # Invariants
//! - Keys are single plain file names; separators, `.`/`..` and absolute
//!   paths are rejected before any filesystem call.
//! - Every resolved path is absolute and lies inside the (canonical) root.
//! - `write` never overwrites an existing blob.

use log::{debug, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

pub type BlobResult<T> = Result<T, BlobError>;

/// Blob store failure.
#[derive(Debug)]
pub enum BlobError {
    /// Key is not a plain file name.
    UnsafeKey(String),
    /// Path resolves outside the managed root.
    OutsideRoot { path: PathBuf, root: PathBuf },
    /// Underlying filesystem failure.
    Io {
        op: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Display for BlobError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsafeKey(key) => write!(f, "unsafe blob key `{key}`"),
            Self::OutsideRoot { path, root } => write!(
                f,
                "path `{}` is outside blob root `{}`",
                path.display(),
                root.display()
            ),
            Self::Io { op, path, source } => {
                write!(f, "blob {op} failed for `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for BlobError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::UnsafeKey(_) | Self::OutsideRoot { .. } => None,
        }
    }
}

fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> BlobError {
    BlobError::Io {
        op,
        path: path.to_path_buf(),
        source,
    }
}

/// Result of a tolerant delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    /// Nothing was on disk under that key.
    Missing,
}

/// Storage contract used by the attachment coordinator and backup engine.
pub trait BlobStore: Send + Sync {
    /// Absolute managed root directory.
    fn root(&self) -> &Path;
    /// Maps a key to its absolute path inside the root.
    fn resolve(&self, key: &str) -> BlobResult<PathBuf>;
    /// Creates a new blob; fails if the key already exists.
    fn write(&self, key: &str, bytes: &[u8]) -> BlobResult<PathBuf>;
    /// Copies an external file into the store under `key`.
    fn import_file(&self, source: &Path, key: &str) -> BlobResult<PathBuf>;
    /// Copies a stored blob out to `destination`, returning bytes copied.
    fn export_file(&self, key: &str, destination: &Path) -> BlobResult<u64>;
    /// Deletes a blob, tolerating its absence.
    fn remove(&self, key: &str) -> BlobResult<RemoveOutcome>;

    /// Verifies that an arbitrary (possibly persisted) path stays inside the
    /// root and returns its absolute, normalized form.
    fn ensure_within_root(&self, path: &Path) -> BlobResult<PathBuf> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|err| io_error("resolve", path, err))?
                .join(path)
        };
        let normalized = normalize_lexically(&absolute);
        // Existing paths are also checked after symlink resolution.
        let effective = match fs::canonicalize(&normalized) {
            Ok(canonical) => canonical,
            Err(_) => normalized,
        };
        if effective.starts_with(self.root()) && effective != self.root() {
            Ok(effective)
        } else {
            Err(BlobError::OutsideRoot {
                path: effective,
                root: self.root().to_path_buf(),
            })
        }
    }
}

/// Filesystem-backed blob store rooted at one directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Creates the root directory when missing and pins its canonical path.
    pub fn open(root: impl AsRef<Path>) -> BlobResult<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|err| io_error("create_root", root, err))?;
        let root = fs::canonicalize(root).map_err(|err| io_error("canonicalize", root, err))?;
        Ok(Self { root })
    }
}

impl BlobStore for FsBlobStore {
    fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> BlobResult<PathBuf> {
        validate_key(key)?;
        self.ensure_within_root(&self.root.join(key))
    }

    fn write(&self, key: &str, bytes: &[u8]) -> BlobResult<PathBuf> {
        let path = self.resolve(key)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|err| io_error("create", &path, err))?;

        if let Err(err) = file.write_all(bytes).and_then(|()| file.sync_all()) {
            drop(file);
            if let Err(cleanup_err) = fs::remove_file(&path) {
                warn!(
                    "event=blob_write module=blob status=error error_code=partial_cleanup_failed key={} error={}",
                    key, cleanup_err
                );
            }
            return Err(io_error("write", &path, err));
        }

        debug!(
            "event=blob_write module=blob status=ok key={} bytes={}",
            key,
            bytes.len()
        );
        Ok(path)
    }

    fn import_file(&self, source: &Path, key: &str) -> BlobResult<PathBuf> {
        let path = self.resolve(key)?;
        if path.exists() {
            return Err(io_error(
                "import",
                &path,
                std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            ));
        }
        fs::copy(source, &path).map_err(|err| io_error("import", source, err))?;
        debug!("event=blob_import module=blob status=ok key={}", key);
        Ok(path)
    }

    fn export_file(&self, key: &str, destination: &Path) -> BlobResult<u64> {
        let path = self.resolve(key)?;
        fs::copy(&path, destination).map_err(|err| io_error("export", &path, err))
    }

    fn remove(&self, key: &str) -> BlobResult<RemoveOutcome> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("event=blob_remove module=blob status=ok key={}", key);
                Ok(RemoveOutcome::Removed)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(RemoveOutcome::Missing),
            Err(err) => Err(io_error("remove", &path, err)),
        }
    }
}

fn validate_key(key: &str) -> BlobResult<()> {
    let mut components = Path::new(key).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !plain || key.contains(['/', '\\']) || key.trim() != key {
        return Err(BlobError::UnsafeKey(key.to_string()));
    }
    Ok(())
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
