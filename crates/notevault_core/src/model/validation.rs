//! Input validation rules for user-supplied names, titles and files.
//!
//! # Responsibility
//! - Normalize folder names and note titles before persistence.
//! - Gate attachment extensions through an explicit allow-list.
//! - Reject backup handles that could escape the export root.
//!
//! # Invariants
//! - Validation is pure: no storage access, no side effects.
//! - Length limits count Unicode scalar values, not bytes.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub const FOLDER_NAME_MAX_CHARS: usize = 255;
pub const NOTE_TITLE_MAX_CHARS: usize = 500;
pub const NOTE_CONTENT_MAX_CHARS: usize = 1_000_000;

/// Lowercase attachment extensions accepted for upload, without the dot.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "pdf", "txt", "doc", "docx", "xls",
    "xlsx", "ppt", "pptx", "zip", "rar", "7z", "tar", "gz",
];

static FOLDER_NAME_FORBIDDEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\p{Cc}]"#).expect("valid folder name regex"));
static BACKUP_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid backup name regex"));

/// Rule violated by caller input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Value is blank after trimming.
    Empty { field: &'static str },
    /// Value exceeds its character limit.
    TooLong {
        field: &'static str,
        max_chars: usize,
        actual_chars: usize,
    },
    /// Value contains a character outside the accepted set.
    ForbiddenCharacter { field: &'static str, character: char },
    /// File extension is missing or not on the allow-list.
    DisallowedExtension(String),
    /// Upload payload has zero bytes.
    EmptyFile(String),
    /// Upload payload exceeds the configured per-file limit.
    FileTooLarge {
        original_name: String,
        max_bytes: u64,
        actual_bytes: u64,
    },
    /// Batch exceeds the configured files-per-request limit.
    TooManyFiles { max_files: usize, actual: usize },
    /// Backup handle is not a plain directory name.
    InvalidBackupName(String),
    /// Snapshot document does not have the expected shape.
    MalformedSnapshot(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty { field } => write!(f, "{field} must not be blank"),
            Self::TooLong {
                field,
                max_chars,
                actual_chars,
            } => write!(
                f,
                "{field} must be at most {max_chars} characters, got {actual_chars}"
            ),
            Self::ForbiddenCharacter { field, character } => {
                write!(f, "{field} contains forbidden character {character:?}")
            }
            Self::DisallowedExtension(name) => {
                write!(f, "file type is not allowed: `{name}`")
            }
            Self::EmptyFile(name) => write!(f, "file is empty: `{name}`"),
            Self::FileTooLarge {
                original_name,
                max_bytes,
                actual_bytes,
            } => write!(
                f,
                "file `{original_name}` is {actual_bytes} bytes; maximum is {max_bytes}"
            ),
            Self::TooManyFiles { max_files, actual } => {
                write!(f, "too many files: {actual}; maximum is {max_files} per upload")
            }
            Self::InvalidBackupName(name) => write!(f, "invalid backup name: `{name}`"),
            Self::MalformedSnapshot(details) => write!(f, "invalid backup data: {details}"),
        }
    }
}

impl Error for ValidationError {}

/// Trims and validates a folder name.
pub fn normalize_folder_name(value: &str) -> Result<String, ValidationError> {
    let trimmed = bounded_trimmed("folder name", value, FOLDER_NAME_MAX_CHARS)?;
    if let Some(found) = FOLDER_NAME_FORBIDDEN_RE.find(trimmed) {
        let character = found.as_str().chars().next().unwrap_or_default();
        return Err(ValidationError::ForbiddenCharacter {
            field: "folder name",
            character,
        });
    }
    Ok(trimmed.to_string())
}

/// Trims and validates a note title.
pub fn normalize_note_title(value: &str) -> Result<String, ValidationError> {
    bounded_trimmed("note title", value, NOTE_TITLE_MAX_CHARS).map(str::to_string)
}

/// Validates note body length. Content is stored verbatim.
pub fn validate_note_content(value: &str) -> Result<(), ValidationError> {
    let actual_chars = value.chars().count();
    if actual_chars > NOTE_CONTENT_MAX_CHARS {
        return Err(ValidationError::TooLong {
            field: "note content",
            max_chars: NOTE_CONTENT_MAX_CHARS,
            actual_chars,
        });
    }
    Ok(())
}

/// Returns the lowercase allow-listed extension of `original_name`.
pub fn allowed_extension(original_name: &str) -> Result<String, ValidationError> {
    let extension = Path::new(original_name.trim())
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| ValidationError::DisallowedExtension(original_name.to_string()))?;

    if ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        Ok(extension)
    } else {
        Err(ValidationError::DisallowedExtension(original_name.to_string()))
    }
}

/// Accepts only plain, non-hidden directory names.
pub fn validate_backup_name(name: &str) -> Result<(), ValidationError> {
    if !BACKUP_NAME_RE.is_match(name) || name.contains("..") {
        return Err(ValidationError::InvalidBackupName(name.to_string()));
    }
    Ok(())
}

fn bounded_trimmed<'a>(
    field: &'static str,
    value: &'a str,
    max_chars: usize,
) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    let actual_chars = trimmed.chars().count();
    if actual_chars > max_chars {
        return Err(ValidationError::TooLong {
            field,
            max_chars,
            actual_chars,
        });
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::{
        allowed_extension, normalize_folder_name, normalize_note_title, validate_backup_name,
        ValidationError, FOLDER_NAME_MAX_CHARS,
    };

    #[test]
    fn folder_name_is_trimmed() {
        assert_eq!(normalize_folder_name("  Projects ").unwrap(), "Projects");
    }

    #[test]
    fn folder_name_rejects_path_characters() {
        for name in ["a/b", "a\\b", "what?", "x:y", "<tag>", "pipe|", "star*", "quo\"te"] {
            let err = normalize_folder_name(name).unwrap_err();
            assert!(
                matches!(err, ValidationError::ForbiddenCharacter { .. }),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn folder_name_rejects_control_characters() {
        let err = normalize_folder_name("tab\there").unwrap_err();
        assert_eq!(
            err,
            ValidationError::ForbiddenCharacter {
                field: "folder name",
                character: '\t'
            }
        );
    }

    #[test]
    fn folder_name_length_counts_characters() {
        let at_limit = "é".repeat(FOLDER_NAME_MAX_CHARS);
        assert!(normalize_folder_name(&at_limit).is_ok());

        let over = "é".repeat(FOLDER_NAME_MAX_CHARS + 1);
        assert!(matches!(
            normalize_folder_name(&over),
            Err(ValidationError::TooLong { actual_chars, .. }) if actual_chars == FOLDER_NAME_MAX_CHARS + 1
        ));
    }

    #[test]
    fn blank_title_is_rejected() {
        assert_eq!(
            normalize_note_title("   ").unwrap_err(),
            ValidationError::Empty {
                field: "note title"
            }
        );
    }

    #[test]
    fn extension_allow_list_is_case_insensitive() {
        assert_eq!(allowed_extension("Scan.PDF").unwrap(), "pdf");
        assert_eq!(allowed_extension("archive.tar.gz").unwrap(), "gz");
        assert!(allowed_extension("script.sh").is_err());
        assert!(allowed_extension("README").is_err());
    }

    #[test]
    fn backup_name_rejects_traversal_and_hidden_names() {
        assert!(validate_backup_name("3f2c9a7e-backup").is_ok());
        assert!(validate_backup_name("../etc").is_err());
        assert!(validate_backup_name(".staging-1").is_err());
        assert!(validate_backup_name("a/b").is_err());
        assert!(validate_backup_name("a..b").is_err());
        assert!(validate_backup_name("").is_err());
    }
}
