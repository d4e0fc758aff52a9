//! NoteVault schema history.
//!
//! # Responsibility
//! - List the schema scripts for folders, notes and attachments.
//! - Bring a connection up to the newest script in one transaction.
//! - Confirm the Root folder survived once the schema is current.
//!
//! # Invariants
//! - Versions start at 1 and increase by one; the applied version lives in
//!   `PRAGMA user_version`.
//! - Script 1 seeds Root (id 1). Application code never inserts it.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "folders_notes_attachments",
        sql: include_str!("0001_init.sql"),
    },
    Migration {
        version: 2,
        name: "lookup_indexes",
        sql: include_str!("0002_indexes.sql"),
    },
];

/// Newest schema version this build can write.
pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// Runs every script newer than the stored version and returns how many ran.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let stored: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let latest = latest_version();
    if stored > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: stored,
            latest_supported: latest,
        });
    }

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > stored)
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for migration in &pending {
        tx.execute_batch(migration.sql)
            .and_then(|()| tx.pragma_update(None, "user_version", migration.version))
            .map_err(|source| DbError::Migration {
                version: migration.version,
                name: migration.name,
                source,
            })?;
    }
    tx.commit()?;

    for migration in &pending {
        info!(
            "event=db_migrate module=db status=ok version={} name={}",
            migration.version, migration.name
        );
    }
    Ok(pending.len())
}

/// Fails unless exactly one parent-less folder exists.
pub fn verify_root(conn: &Connection) -> DbResult<()> {
    let roots: i64 = conn.query_row(
        "SELECT COUNT(*) FROM folders WHERE parent_id IS NULL;",
        [],
        |row| row.get(0),
    )?;
    if roots == 1 {
        Ok(())
    } else {
        Err(DbError::RootMissing)
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, latest_version, MIGRATIONS};
    use rusqlite::Connection;

    #[test]
    fn versions_are_dense_from_one() {
        for (index, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version as usize, index + 1, "{}", migration.name);
        }
    }

    #[test]
    fn second_run_applies_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(apply_migrations(&mut conn).unwrap(), MIGRATIONS.len());
        assert_eq!(apply_migrations(&mut conn).unwrap(), 0);

        let version: u32 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, latest_version());
    }
}
