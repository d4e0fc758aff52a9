//! Unit-of-work coordinator over the shared SQLite connection.
//!
//! # Responsibility
//! - Own the single process-wide connection and serialize access to it.
//! - Run closures inside a transaction: commit on success, roll back when the
//!   closure fails or when COMMIT itself fails, then propagate.
//!
//! # Invariants
//! - Every folder structural mutation and every snapshot import/export runs
//!   through [`Store::run`] or [`Store::run_with_timeout`].
//! - Write transactions begin `IMMEDIATE`, so the RESERVED lock is held from
//!   the first read; checks performed inside the closure stay valid at commit.
//! - Read transactions observe one consistent snapshot of all tables.

use crate::db::{open_db, open_db_in_memory, DbError, DbResult};
use log::{debug, error, warn};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::{Duration, Instant};

/// Transaction intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    /// Consistent read view; no writes expected.
    Read,
    /// Serialized writer holding the database write lock for its duration.
    Write,
}

impl TxMode {
    fn behavior(self) -> TransactionBehavior {
        match self {
            Self::Read => TransactionBehavior::Deferred,
            Self::Write => TransactionBehavior::Immediate,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

/// Failures raised by the coordinator itself.
#[derive(Debug)]
pub enum StoreError {
    /// BEGIN, COMMIT or a statement inside the unit of work failed.
    Db(DbError),
    /// The connection could not be acquired within the bounded wait.
    LockTimeout { waited: Duration },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::LockTimeout { waited } => write!(
                f,
                "timed out after {} ms waiting for the database",
                waited.as_millis()
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::LockTimeout { .. } => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Shared relational store handle.
///
/// Wrap in `Arc` and pass explicitly to every service that needs it.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Wraps an already migrated connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        open_db(path).map(Self::new)
    }

    /// Opens (and migrates) a private in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        open_db_in_memory().map(Self::new)
    }

    /// Runs `work` as one transaction, waiting as long as needed for the
    /// connection.
    pub fn run<T, E, F>(&self, mode: TxMode, work: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError> + Display,
    {
        let mut conn = self.conn.lock();
        run_in_transaction(&mut conn, mode, work)
    }

    /// Runs `work` as one transaction, giving up with
    /// [`StoreError::LockTimeout`] when the connection is not available
    /// within `wait`.
    pub fn run_with_timeout<T, E, F>(&self, mode: TxMode, wait: Duration, work: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError> + Display,
    {
        let Some(mut conn) = self.conn.try_lock_for(wait) else {
            warn!(
                "event=tx_begin module=store status=error mode={} error_code=lock_timeout waited_ms={}",
                mode.as_str(),
                wait.as_millis()
            );
            return Err(StoreError::LockTimeout { waited: wait }.into());
        };
        run_in_transaction(&mut conn, mode, work)
    }
}

fn run_in_transaction<T, E, F>(conn: &mut Connection, mode: TxMode, work: F) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<StoreError> + Display,
{
    let started_at = Instant::now();
    let tx = conn
        .transaction_with_behavior(mode.behavior())
        .map_err(|err| E::from(StoreError::from(err)))?;

    let value = match work(&tx) {
        Ok(value) => value,
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                error!(
                    "event=tx_rollback module=store status=error mode={} error={}",
                    mode.as_str(),
                    rollback_err
                );
            }
            debug!(
                "event=tx_rollback module=store status=ok mode={} duration_ms={} cause={}",
                mode.as_str(),
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }
    };

    // A failed COMMIT leaves the transaction open; `commit` drops it with the
    // default rollback behavior before returning the error.
    if let Err(err) = tx.commit() {
        error!(
            "event=tx_commit module=store status=error mode={} duration_ms={} error={}",
            mode.as_str(),
            started_at.elapsed().as_millis(),
            err
        );
        return Err(StoreError::from(err).into());
    }

    debug!(
        "event=tx_commit module=store status=ok mode={} duration_ms={}",
        mode.as_str(),
        started_at.elapsed().as_millis()
    );
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::{Store, StoreError, TxMode};
    use crate::error::CoreError;
    use std::sync::Arc;
    use std::time::Duration;

    fn note_count(store: &Store) -> i64 {
        store
            .run(TxMode::Read, |tx| {
                tx.query_row("SELECT COUNT(*) FROM notes;", [], |row| row.get(0))
                    .map_err(CoreError::from)
            })
            .unwrap()
    }

    #[test]
    fn successful_work_is_committed() {
        let store = Store::open_in_memory().unwrap();
        store
            .run(TxMode::Write, |tx| {
                tx.execute("INSERT INTO notes (title) VALUES ('a');", [])
                    .map_err(CoreError::from)
            })
            .unwrap();
        assert_eq!(note_count(&store), 1);
    }

    #[test]
    fn failing_work_is_rolled_back() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<(), CoreError> = store.run(TxMode::Write, |tx| {
            tx.execute("INSERT INTO notes (title) VALUES ('a');", [])?;
            tx.execute("INSERT INTO notes (title) VALUES ('b');", [])?;
            Err(CoreError::Conflict("late failure".to_string()))
        });
        assert!(matches!(result, Err(CoreError::Conflict(_))));
        assert_eq!(note_count(&store), 0);
    }

    #[test]
    fn bounded_wait_times_out_while_connection_is_held() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let holder = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                store
                    .run(TxMode::Write, |_tx| {
                        held_tx.send(()).unwrap();
                        release_rx.recv().unwrap();
                        Ok::<_, CoreError>(())
                    })
                    .unwrap();
            })
        };

        held_rx.recv().unwrap();
        let result: Result<(), CoreError> =
            store.run_with_timeout(TxMode::Write, Duration::from_millis(20), |_tx| Ok(()));
        assert!(matches!(
            result,
            Err(CoreError::Transaction(StoreError::LockTimeout { .. }))
        ));

        release_tx.send(()).unwrap();
        holder.join().unwrap();
    }
}
