pub mod sqlite;
pub mod repository;

pub use sqlite::*;
pub use repository::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    /// A UNIQUE constraint rejected the write (same content hash or same file path).
    #[error("Uniqueness conflict: {0}")]
    Conflict(String),

    #[error("Invalid state for {entity_type} {id}: expected {expected}, found {actual}")]
    InvalidState {
        entity_type: String,
        id: String,
        expected: String,
        actual: String,
    },

    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid timestamp in column {column}: {value}")]
    InvalidTimestamp { column: String, value: String },
}

impl DatabaseError {
    /// Map rusqlite UNIQUE violations to `Conflict`, everything else to `Sqlite`.
    pub fn from_write(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                DatabaseError::Conflict(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => DatabaseError::Sqlite(err),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DatabaseError::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_maps_to_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT UNIQUE); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .map_err(DatabaseError::from_write)
            .unwrap_err();
        assert!(err.is_conflict(), "got {err:?}");
    }

    #[test]
    fn other_constraint_is_not_conflict() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT NOT NULL);").unwrap();
        let err = conn
            .execute("INSERT INTO t VALUES (NULL)", [])
            .map_err(DatabaseError::from_write)
            .unwrap_err();
        assert!(!err.is_conflict());
    }
}
