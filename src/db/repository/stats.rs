use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use super::{count_documents, count_pending, format_timestamp};
use crate::db::DatabaseError;

/// Recent processing activity for one (action, status) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityCount {
    pub action: String,
    pub status: String,
    pub count: i64,
}

/// Snapshot of the index and the last 24 hours of processing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingStats {
    pub total_documents: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
    pub recent_activity: Vec<ActivityCount>,
    pub pending_triggers: i64,
}

pub fn get_processing_stats(conn: &Connection) -> Result<ProcessingStats, DatabaseError> {
    let since = format_timestamp(&(Utc::now() - Duration::hours(24)));

    Ok(ProcessingStats {
        total_documents: count_documents(conn)?,
        by_status: group_count(conn, "status")?,
        by_type: group_count(conn, "document_type")?,
        recent_activity: recent_activity(conn, &since)?,
        pending_triggers: count_pending(conn)?,
    })
}

fn group_count(conn: &Connection, column: &str) -> Result<BTreeMap<String, i64>, DatabaseError> {
    let sql = format!("SELECT {column}, COUNT(*) FROM documents GROUP BY {column}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

    let mut counts = BTreeMap::new();
    for row in rows {
        let (key, count) = row?;
        counts.insert(key, count);
    }
    Ok(counts)
}

fn recent_activity(conn: &Connection, since: &str) -> Result<Vec<ActivityCount>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT action, status, COUNT(*) FROM processing_log
         WHERE timestamp >= ?1
         GROUP BY action, status
         ORDER BY action, status",
    )?;
    let rows = stmt.query_map(params![since], |row| {
        Ok(ActivityCount {
            action: row.get(0)?,
            status: row.get(1)?,
            count: row.get(2)?,
        })
    })?;

    let mut activity = Vec::new();
    for row in rows {
        activity.push(row?);
    }
    Ok(activity)
}
