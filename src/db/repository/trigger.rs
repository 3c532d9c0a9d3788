use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{now_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

const TRIGGER_COLUMNS: &str =
    "id, document_id, trigger_type, payload, status, created_at, executed_at, failure_reason";

struct TriggerRow {
    id: i64,
    document_id: i64,
    trigger_type: String,
    payload: String,
    status: String,
    created_at: String,
    executed_at: Option<String>,
    failure_reason: Option<String>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<TriggerRow> {
    Ok(TriggerRow {
        id: row.get(0)?,
        document_id: row.get(1)?,
        trigger_type: row.get(2)?,
        payload: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        executed_at: row.get(6)?,
        failure_reason: row.get(7)?,
    })
}

fn trigger_from_row(row: TriggerRow) -> Result<WorkflowTrigger, DatabaseError> {
    Ok(WorkflowTrigger {
        id: row.id,
        document_id: row.document_id,
        trigger_type: TriggerType::from_str(&row.trigger_type)?,
        payload: serde_json::from_str(&row.payload)?,
        status: TriggerStatus::from_str(&row.status)?,
        created_at: parse_timestamp("created_at", &row.created_at)?,
        executed_at: row
            .executed_at
            .as_deref()
            .map(|ts| parse_timestamp("executed_at", ts))
            .transpose()?,
        failure_reason: row.failure_reason,
    })
}

/// Create a PENDING trigger for an indexed document.
pub fn create_trigger(
    conn: &Connection,
    document_id: i64,
    trigger_type: TriggerType,
    payload: &serde_json::Value,
) -> Result<WorkflowTrigger, DatabaseError> {
    let known: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM documents WHERE id = ?1)",
        params![document_id],
        |row| row.get(0),
    )?;
    if !known {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: document_id.to_string(),
        });
    }

    conn.execute(
        "INSERT INTO workflow_triggers (document_id, trigger_type, payload, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            document_id,
            trigger_type.as_str(),
            serde_json::to_string(payload)?,
            TriggerStatus::Pending.as_str(),
            now_timestamp(),
        ],
    )?;

    let id = conn.last_insert_rowid();
    get_trigger(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "WorkflowTrigger".into(),
        id: id.to_string(),
    })
}

pub fn get_trigger(conn: &Connection, id: i64) -> Result<Option<WorkflowTrigger>, DatabaseError> {
    let sql = format!("SELECT {TRIGGER_COLUMNS} FROM workflow_triggers WHERE id = ?1");
    let row = conn.query_row(&sql, params![id], read_row).optional()?;
    row.map(trigger_from_row).transpose()
}

/// Pending triggers, oldest first, optionally restricted to one type.
pub fn list_pending(
    conn: &Connection,
    trigger_type: Option<TriggerType>,
) -> Result<Vec<WorkflowTrigger>, DatabaseError> {
    let sql = format!(
        "SELECT {TRIGGER_COLUMNS} FROM workflow_triggers
         WHERE status = 'PENDING' AND (?1 IS NULL OR trigger_type = ?1)
         ORDER BY created_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![trigger_type.map(|t| t.as_str())], read_row)?;

    let mut triggers = Vec::new();
    for row in rows {
        triggers.push(trigger_from_row(row?)?);
    }
    Ok(triggers)
}

pub fn list_for_document(
    conn: &Connection,
    document_id: i64,
) -> Result<Vec<WorkflowTrigger>, DatabaseError> {
    let sql = format!(
        "SELECT {TRIGGER_COLUMNS} FROM workflow_triggers
         WHERE document_id = ?1 ORDER BY id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![document_id], read_row)?;

    let mut triggers = Vec::new();
    for row in rows {
        triggers.push(trigger_from_row(row?)?);
    }
    Ok(triggers)
}

pub fn count_pending(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM workflow_triggers WHERE status = 'PENDING'",
        [],
        |row| row.get(0),
    )?)
}

/// PENDING -> EXECUTED.
pub fn mark_executed(conn: &Connection, id: i64) -> Result<WorkflowTrigger, DatabaseError> {
    transition(conn, id, TriggerStatus::Executed, None)
}

/// PENDING -> FAILED, recording why.
pub fn mark_failed(
    conn: &Connection,
    id: i64,
    reason: &str,
) -> Result<WorkflowTrigger, DatabaseError> {
    transition(conn, id, TriggerStatus::Failed, Some(reason))
}

/// Terminal transitions are a single conditional UPDATE, so two executors
/// racing on the same trigger cannot both succeed.
fn transition(
    conn: &Connection,
    id: i64,
    target: TriggerStatus,
    reason: Option<&str>,
) -> Result<WorkflowTrigger, DatabaseError> {
    let changed = conn.execute(
        "UPDATE workflow_triggers
         SET status = ?1, executed_at = ?2, failure_reason = ?3
         WHERE id = ?4 AND status = 'PENDING'",
        params![target.as_str(), now_timestamp(), reason, id],
    )?;

    let current = get_trigger(conn, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "WorkflowTrigger".into(),
        id: id.to_string(),
    })?;

    if changed == 0 {
        return Err(DatabaseError::InvalidState {
            entity_type: "WorkflowTrigger".into(),
            id: id.to_string(),
            expected: TriggerStatus::Pending.as_str().into(),
            actual: current.status.as_str().into(),
        });
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::insert_document;
    use crate::db::sqlite::open_memory_database;
    use chrono::NaiveDate;
    use serde_json::json;

    fn seed_document(conn: &Connection, hash: &str) -> i64 {
        insert_document(
            conn,
            &NewDocument {
                file_path: format!("/in/{hash}.pdf"),
                content_hash: hash.into(),
                client_name: "ACME ASSURANCE".into(),
                document_reference: "B-2026-001".into(),
                counterpart_name: UNKNOWN.into(),
                document_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
                keywords: vec!["bordereau".into()],
                document_type: DocumentType::Bordereau,
                status: DocumentStatus::Indexed,
                raw_text: String::new(),
                extraction_confidence: None,
                processing_errors: None,
            },
        )
        .unwrap()
    }

    #[test]
    fn create_starts_pending() {
        let conn = open_memory_database().unwrap();
        let doc = seed_document(&conn, "h1");
        let payload = json!({"client_name": "ACME ASSURANCE", "priority": "normal"});

        let trigger = create_trigger(&conn, doc, TriggerType::AutoAssignment, &payload).unwrap();
        assert_eq!(trigger.document_id, doc);
        assert_eq!(trigger.status, TriggerStatus::Pending);
        assert_eq!(trigger.payload, payload);
        assert!(trigger.executed_at.is_none());
        assert!(trigger.failure_reason.is_none());
    }

    #[test]
    fn create_for_unknown_document_is_not_found() {
        let conn = open_memory_database().unwrap();
        let err = create_trigger(&conn, 42, TriggerType::SlaMonitoring, &json!({})).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[test]
    fn list_pending_oldest_first_with_filter() {
        let conn = open_memory_database().unwrap();
        let doc = seed_document(&conn, "h1");
        let a = create_trigger(&conn, doc, TriggerType::AutoAssignment, &json!({})).unwrap();
        let b = create_trigger(&conn, doc, TriggerType::SlaMonitoring, &json!({})).unwrap();

        let all: Vec<i64> = list_pending(&conn, None).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(all, vec![a.id, b.id]);

        let sla = list_pending(&conn, Some(TriggerType::SlaMonitoring)).unwrap();
        assert_eq!(sla.len(), 1);
        assert_eq!(sla[0].id, b.id);

        assert!(list_pending(&conn, Some(TriggerType::ComplaintProcessing))
            .unwrap()
            .is_empty());
        assert_eq!(count_pending(&conn).unwrap(), 2);
    }

    #[test]
    fn mark_executed_is_terminal() {
        let conn = open_memory_database().unwrap();
        let doc = seed_document(&conn, "h1");
        let t = create_trigger(&conn, doc, TriggerType::AutoAssignment, &json!({})).unwrap();

        let done = mark_executed(&conn, t.id).unwrap();
        assert_eq!(done.status, TriggerStatus::Executed);
        assert!(done.executed_at.is_some());
        assert!(list_pending(&conn, None).unwrap().is_empty());

        let err = mark_executed(&conn, t.id).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidState { ref actual, .. } if actual == "EXECUTED"));
        let err = mark_failed(&conn, t.id, "late").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidState { .. }));
    }

    #[test]
    fn mark_failed_records_reason() {
        let conn = open_memory_database().unwrap();
        let doc = seed_document(&conn, "h1");
        let t = create_trigger(&conn, doc, TriggerType::ComplaintProcessing, &json!({})).unwrap();

        let failed = mark_failed(&conn, t.id, "no assignee available").unwrap();
        assert_eq!(failed.status, TriggerStatus::Failed);
        assert_eq!(failed.failure_reason.as_deref(), Some("no assignee available"));
        assert!(failed.executed_at.is_some());

        assert!(matches!(
            mark_executed(&conn, t.id).unwrap_err(),
            DatabaseError::InvalidState { ref actual, .. } if actual == "FAILED"
        ));
    }

    #[test]
    fn transition_on_unknown_trigger_is_not_found() {
        let conn = open_memory_database().unwrap();
        assert!(matches!(
            mark_executed(&conn, 999).unwrap_err(),
            DatabaseError::NotFound { .. }
        ));
        assert!(matches!(
            mark_failed(&conn, 999, "x").unwrap_err(),
            DatabaseError::NotFound { .. }
        ));
    }

    #[test]
    fn list_for_document_scopes_by_document() {
        let conn = open_memory_database().unwrap();
        let d1 = seed_document(&conn, "h1");
        let d2 = seed_document(&conn, "h2");
        create_trigger(&conn, d1, TriggerType::AutoAssignment, &json!({})).unwrap();
        create_trigger(&conn, d1, TriggerType::SlaMonitoring, &json!({})).unwrap();
        create_trigger(&conn, d2, TriggerType::SlaMonitoring, &json!({})).unwrap();

        assert_eq!(list_for_document(&conn, d1).unwrap().len(), 2);
        assert_eq!(list_for_document(&conn, d2).unwrap().len(), 1);
    }
}
