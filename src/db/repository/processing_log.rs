use std::str::FromStr;

use rusqlite::{params, Connection, Row};

use super::{now_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

struct LogRow {
    id: i64,
    file_path: String,
    action: String,
    status: String,
    details: String,
    timestamp: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<LogRow> {
    Ok(LogRow {
        id: row.get(0)?,
        file_path: row.get(1)?,
        action: row.get(2)?,
        status: row.get(3)?,
        details: row.get(4)?,
        timestamp: row.get(5)?,
    })
}

fn entry_from_row(row: LogRow) -> Result<ProcessingLogEntry, DatabaseError> {
    Ok(ProcessingLogEntry {
        id: row.id,
        file_path: row.file_path,
        action: LogAction::from_str(&row.action)?,
        status: LogStatus::from_str(&row.status)?,
        details: serde_json::from_str(&row.details)?,
        timestamp: parse_timestamp("timestamp", &row.timestamp)?,
    })
}

/// Append one entry to the audit trail. Entries are never updated or deleted.
pub fn append_log(conn: &Connection, entry: &NewLogEntry) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO processing_log (file_path, action, status, details, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.file_path,
            entry.action.as_str(),
            entry.status.as_str(),
            serde_json::to_string(&entry.details)?,
            now_timestamp(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent entries first.
pub fn list_log(conn: &Connection, limit: usize) -> Result<Vec<ProcessingLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, file_path, action, status, details, timestamp
         FROM processing_log ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], read_row)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(entry_from_row(row?)?);
    }
    Ok(entries)
}

/// Every attempt recorded for one path, in the order they happened.
pub fn list_log_for_path(
    conn: &Connection,
    file_path: &str,
) -> Result<Vec<ProcessingLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, file_path, action, status, details, timestamp
         FROM processing_log WHERE file_path = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![file_path], read_row)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(entry_from_row(row?)?);
    }
    Ok(entries)
}

pub fn count_log(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM processing_log", [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use serde_json::json;

    #[test]
    fn append_and_list_round_trip() {
        let conn = open_memory_database().unwrap();
        let id = append_log(
            &conn,
            &NewLogEntry::new(
                "/in/a.pdf",
                LogAction::Processed,
                LogStatus::Success,
                json!({"document_id": 1, "document_type": "BORDEREAU"}),
            ),
        )
        .unwrap();

        let entries = list_log(&conn, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(entries[0].action, LogAction::Processed);
        assert_eq!(entries[0].details["document_type"], "BORDEREAU");
    }

    #[test]
    fn list_log_is_newest_first_and_limited() {
        let conn = open_memory_database().unwrap();
        for action in [LogAction::Processed, LogAction::Duplicate, LogAction::Error] {
            append_log(
                &conn,
                &NewLogEntry::new("/in/a.pdf", action, LogStatus::Skipped, json!({})),
            )
            .unwrap();
        }
        let entries = list_log(&conn, 2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, LogAction::Error);
        assert_eq!(entries[1].action, LogAction::Duplicate);
        assert_eq!(count_log(&conn).unwrap(), 3);
    }

    #[test]
    fn list_for_path_is_chronological() {
        let conn = open_memory_database().unwrap();
        append_log(
            &conn,
            &NewLogEntry::new("/in/a.pdf", LogAction::Processed, LogStatus::Success, json!({})),
        )
        .unwrap();
        append_log(
            &conn,
            &NewLogEntry::new("/in/b.pdf", LogAction::Error, LogStatus::Failed, json!({})),
        )
        .unwrap();
        append_log(
            &conn,
            &NewLogEntry::new("/in/a.pdf", LogAction::Duplicate, LogStatus::Skipped, json!({})),
        )
        .unwrap();

        let actions: Vec<LogAction> = list_log_for_path(&conn, "/in/a.pdf")
            .unwrap()
            .iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec![LogAction::Processed, LogAction::Duplicate]);
    }
}
