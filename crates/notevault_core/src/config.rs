//! Runtime configuration for the core services.
//!
//! # Responsibility
//! - Derive the persisted layout (database file, upload root, export root,
//!   log directory) from one data directory.
//! - Provide upload limit presets and bounded-wait settings.
//!
//! # Environment
//! - `NOTEVAULT_UPLOAD_PRESET`: `office` (default) | `images` | `large` | `maximum`.
//! - `NOTEVAULT_DB_WAIT_MS`: bounded wait for upload row writes.
//! - `NOTEVAULT_DEBUG_ERRORS`: `1`/`true` exposes storage detail to callers.
//! - `NOTEVAULT_LOG_LEVEL`: trace|debug|info|warn|error.

use crate::logging::default_log_level;
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DATABASE_FILE_NAME: &str = "notevault.sqlite3";
pub const UPLOAD_DIR_NAME: &str = "uploads";
pub const EXPORT_DIR_NAME: &str = "backups";
pub const LOG_DIR_NAME: &str = "logs";

const DEFAULT_DB_WAIT: Duration = Duration::from_secs(15);
const MIB: u64 = 1024 * 1024;

/// Per-request upload limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadLimits {
    pub max_file_bytes: u64,
    pub max_files: usize,
}

/// Named upload limit presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPreset {
    /// Office documents: 50 MiB per file, 10 files.
    Office,
    /// High-resolution images: 100 MiB per file, 5 files.
    Images,
    /// Large files: 200 MiB per file, 3 files.
    Large,
    /// Upper bound: 500 MiB per file, 2 files.
    Maximum,
}

impl UploadPreset {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "office" => Some(Self::Office),
            "images" => Some(Self::Images),
            "large" => Some(Self::Large),
            "maximum" => Some(Self::Maximum),
            _ => None,
        }
    }

    pub fn limits(self) -> UploadLimits {
        let (max_file_mib, max_files) = match self {
            Self::Office => (50, 10),
            Self::Images => (100, 5),
            Self::Large => (200, 3),
            Self::Maximum => (500, 2),
        };
        UploadLimits {
            max_file_bytes: max_file_mib * MIB,
            max_files,
        }
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        UploadPreset::Office.limits()
    }
}

/// Resolved configuration for one `NoteVault` instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub data_dir: PathBuf,
    pub database_file: PathBuf,
    pub upload_dir: PathBuf,
    pub export_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub upload_limits: UploadLimits,
    /// Bounded wait for relational writes issued on behalf of an upload.
    pub db_wait: Duration,
    /// Expose storage/transaction detail in caller-facing messages.
    pub debug_errors: bool,
}

impl CoreConfig {
    /// Builds the default layout under `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref().to_path_buf();
        Self {
            database_file: data_dir.join(DATABASE_FILE_NAME),
            upload_dir: data_dir.join(UPLOAD_DIR_NAME),
            export_dir: data_dir.join(EXPORT_DIR_NAME),
            log_dir: data_dir.join(LOG_DIR_NAME),
            log_level: default_log_level().to_string(),
            upload_limits: UploadLimits::default(),
            db_wait: DEFAULT_DB_WAIT,
            debug_errors: false,
            data_dir,
        }
    }

    /// Builds the default layout and applies `NOTEVAULT_*` overrides.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Self {
        let mut config = Self::new(data_dir);
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    pub fn with_upload_limits(mut self, limits: UploadLimits) -> Self {
        self.upload_limits = limits;
        self
    }

    pub fn with_db_wait(mut self, wait: Duration) -> Self {
        self.db_wait = wait;
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("NOTEVAULT_UPLOAD_PRESET") {
            match UploadPreset::parse(&value) {
                Some(preset) => self.upload_limits = preset.limits(),
                None => warn!(
                    "event=config_load module=config status=error error_code=unknown_upload_preset value={}",
                    value
                ),
            }
        }
        if let Some(value) = lookup("NOTEVAULT_DB_WAIT_MS") {
            match value.trim().parse::<u64>() {
                Ok(ms) => self.db_wait = Duration::from_millis(ms),
                Err(_) => warn!(
                    "event=config_load module=config status=error error_code=invalid_db_wait value={}",
                    value
                ),
            }
        }
        if let Some(value) = lookup("NOTEVAULT_LOG_LEVEL") {
            self.log_level = value.trim().to_string();
        }
        if let Some(value) = lookup("NOTEVAULT_DEBUG_ERRORS") {
            self.debug_errors = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            );
        }
    }
}
