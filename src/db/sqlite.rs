use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::functions::FunctionFlags;
use rusqlite::Connection;

use super::DatabaseError;

/// How long a writer waits on a locked database file before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::MigrationFailed {
                version: 0,
                reason: format!("cannot create {}: {e}", parent.display()),
            })?;
        }
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    register_functions(conn)
}

/// `lower_unicode(text)`: full Unicode lowercase. SQLite's own `lower` and
/// `LIKE` only fold ASCII.
fn register_functions(conn: &Connection) -> Result<(), DatabaseError> {
    conn.create_scalar_function(
        "lower_unicode",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| v.to_lowercase()))
        },
    )?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![
        (1, include_str!("../../resources/migrations/001_initial.sql")),
    ];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get::<_, Option<i64>>(0),
    )
    .ok()
    .flatten()
    .unwrap_or(0)
}

/// Count tables in the database (for verification)
pub fn count_tables(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

/// The embedded store shared by every worker.
///
/// One connection behind a mutex. Two workers may both pass a duplicate
/// check before either inserts; the UNIQUE constraints decide the winner.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Lock the connection, recovering from a poisoned lock.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let mut guard = self.lock();
        f(&mut guard)
    }
}
