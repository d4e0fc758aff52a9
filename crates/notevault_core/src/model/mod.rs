//! Domain model for folders, notes, attachments and backup snapshots.
//!
//! # Responsibility
//! - Define canonical records shared by repositories, services and snapshots.
//! - Own input validation rules that do not need storage access.
//!
//! # Invariants
//! - Identities are SQLite row ids and are never reused by callers.
//! - Timestamps are Unix epoch milliseconds.

pub mod attachment;
pub mod folder;
pub mod note;
pub mod snapshot;
pub mod validation;
