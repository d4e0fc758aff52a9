//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define row-level data access contracts for folders, notes and
//!   attachment rows.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repositories borrow a connection or an open transaction; they never
//!   begin or commit transactions themselves.
//! - Lookups return `Ok(None)` for missing rows; services map that to
//!   `NotFound`.

pub mod attachment_repo;
pub mod folder_repo;
pub mod note_repo;
