use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{now_timestamp, parse_timestamp};
use crate::db::DatabaseError;
use crate::models::*;

const DOCUMENT_COLUMNS: &str = "id, file_path, content_hash, client_name, document_reference,
     counterpart_name, document_date, keywords, document_type, status, raw_text,
     extraction_confidence, processing_errors, created_at, updated_at";

/// Raw column values, converted to a `DocumentRecord` outside the row closure
/// so enum and JSON errors surface as `DatabaseError` rather than rusqlite errors.
struct DocumentRow {
    id: i64,
    file_path: String,
    content_hash: String,
    client_name: String,
    document_reference: String,
    counterpart_name: String,
    document_date: NaiveDate,
    keywords: String,
    document_type: String,
    status: String,
    raw_text: String,
    extraction_confidence: Option<f32>,
    processing_errors: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        file_path: row.get(1)?,
        content_hash: row.get(2)?,
        client_name: row.get(3)?,
        document_reference: row.get(4)?,
        counterpart_name: row.get(5)?,
        document_date: row.get(6)?,
        keywords: row.get(7)?,
        document_type: row.get(8)?,
        status: row.get(9)?,
        raw_text: row.get(10)?,
        extraction_confidence: row.get(11)?,
        processing_errors: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn document_from_row(row: DocumentRow) -> Result<DocumentRecord, DatabaseError> {
    Ok(DocumentRecord {
        id: row.id,
        file_path: row.file_path,
        content_hash: row.content_hash,
        client_name: row.client_name,
        document_reference: row.document_reference,
        counterpart_name: row.counterpart_name,
        document_date: row.document_date,
        keywords: serde_json::from_str(&row.keywords)?,
        document_type: DocumentType::from_str(&row.document_type)?,
        status: DocumentStatus::from_str(&row.status)?,
        raw_text: row.raw_text,
        extraction_confidence: row.extraction_confidence,
        processing_errors: row.processing_errors,
        created_at: parse_timestamp("created_at", &row.created_at)?,
        updated_at: parse_timestamp("updated_at", &row.updated_at)?,
    })
}

/// Insert a new document record and return its store-assigned id.
///
/// Fails with `DatabaseError::Conflict` when `content_hash` or `file_path`
/// is already indexed. This is the authoritative duplicate check: a prior
/// `is_duplicate` call is only an optimisation.
pub fn insert_document(conn: &Connection, doc: &NewDocument) -> Result<i64, DatabaseError> {
    let now = now_timestamp();
    let keywords = serde_json::to_string(&doc.keywords)?;
    conn.execute(
        "INSERT INTO documents (file_path, content_hash, client_name, document_reference,
         counterpart_name, document_date, keywords, document_type, status, raw_text,
         extraction_confidence, processing_errors, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
        params![
            doc.file_path,
            doc.content_hash,
            doc.client_name,
            doc.document_reference,
            doc.counterpart_name,
            doc.document_date,
            keywords,
            doc.document_type.as_str(),
            doc.status.as_str(),
            doc.raw_text,
            doc.extraction_confidence,
            doc.processing_errors,
            now,
        ],
    )
    .map_err(DatabaseError::from_write)?;
    Ok(conn.last_insert_rowid())
}

pub fn is_duplicate(conn: &Connection, content_hash: &str) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM documents WHERE content_hash = ?1)",
        params![content_hash],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn get_document(conn: &Connection, id: i64) -> Result<Option<DocumentRecord>, DatabaseError> {
    query_one(conn, "id = ?1", Value::Integer(id))
}

pub fn get_document_by_hash(
    conn: &Connection,
    content_hash: &str,
) -> Result<Option<DocumentRecord>, DatabaseError> {
    query_one(conn, "content_hash = ?1", Value::Text(content_hash.to_string()))
}

pub fn get_document_by_path(
    conn: &Connection,
    file_path: &str,
) -> Result<Option<DocumentRecord>, DatabaseError> {
    query_one(conn, "file_path = ?1", Value::Text(file_path.to_string()))
}

fn query_one(
    conn: &Connection,
    predicate: &str,
    value: Value,
) -> Result<Option<DocumentRecord>, DatabaseError> {
    let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE {predicate}");
    let row = conn.query_row(&sql, [value], read_row).optional()?;
    row.map(document_from_row).transpose()
}

pub fn count_documents(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?)
}

/// Multi-criteria search, newest first, at most one page.
///
/// Each criterion becomes a bound parameter; user text never reaches the SQL
/// string. Substring filters compare `lower_unicode` of the column against
/// the lowercased input with `LIKE`, so accented names fold too; `%`, `_`
/// and `\` are escaped.
pub fn search_documents(
    conn: &Connection,
    criteria: &SearchCriteria,
) -> Result<Vec<DocumentRecord>, DatabaseError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    let mut push = |clause: &str, value: Value| {
        values.push(value);
        clauses.push(clause.replace("?", &format!("?{}", values.len())));
    };

    if let Some(client) = non_blank(&criteria.client_name) {
        push(
            "lower_unicode(client_name) LIKE ? ESCAPE '\\'",
            Value::Text(like_pattern(client)),
        );
    }
    if let Some(reference) = non_blank(&criteria.document_reference) {
        push(
            "lower_unicode(document_reference) LIKE ? ESCAPE '\\'",
            Value::Text(like_pattern(reference)),
        );
    }
    if let Some(counterpart) = non_blank(&criteria.counterpart_name) {
        push(
            "lower_unicode(counterpart_name) LIKE ? ESCAPE '\\'",
            Value::Text(like_pattern(counterpart)),
        );
    }
    if let Some(keyword) = non_blank(&criteria.keyword) {
        push(
            "EXISTS (SELECT 1 FROM json_each(documents.keywords) AS kw WHERE kw.value = ?)",
            Value::Text(keyword.to_lowercase()),
        );
    }
    if let Some(doc_type) = criteria.document_type {
        push("document_type = ?", Value::Text(doc_type.as_str().to_string()));
    }
    if let Some(from) = criteria.date_from {
        push("document_date >= ?", Value::Text(from.to_string()));
    }
    if let Some(to) = criteria.date_to {
        push("document_date <= ?", Value::Text(to.to_string()));
    }

    let where_sql = if clauses.is_empty() {
        "1=1".to_string()
    } else {
        clauses.join(" AND ")
    };
    values.push(Value::Integer(criteria.effective_limit() as i64));

    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents
         WHERE {where_sql}
         ORDER BY created_at DESC, id DESC
         LIMIT ?{}",
        values.len()
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), read_row)?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(document_from_row(row?)?);
    }
    Ok(docs)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn new_doc(path: &str, hash: &str, client: &str) -> NewDocument {
        NewDocument {
            file_path: path.into(),
            content_hash: hash.into(),
            client_name: client.into(),
            document_reference: UNKNOWN.into(),
            counterpart_name: UNKNOWN.into(),
            document_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            keywords: vec!["bordereau".into(), "client".into()],
            document_type: DocumentType::Bordereau,
            status: DocumentStatus::Indexed,
            raw_text: "BORDEREAU".into(),
            extraction_confidence: Some(0.9),
            processing_errors: None,
        }
    }

    #[test]
    fn insert_and_read_back() {
        let conn = open_memory_database().unwrap();
        let id = insert_document(&conn, &new_doc("/in/a.pdf", "h1", "ACME")).unwrap();

        let doc = get_document(&conn, id).unwrap().unwrap();
        assert_eq!(doc.file_path, "/in/a.pdf");
        assert_eq!(doc.keywords, vec!["bordereau", "client"]);
        assert_eq!(doc.document_type, DocumentType::Bordereau);
        assert_eq!(doc.created_at, doc.updated_at);

        assert!(get_document_by_hash(&conn, "h1").unwrap().is_some());
        assert!(get_document_by_path(&conn, "/in/a.pdf").unwrap().is_some());
        assert!(get_document(&conn, id + 1).unwrap().is_none());
    }

    #[test]
    fn duplicate_hash_is_conflict() {
        let conn = open_memory_database().unwrap();
        insert_document(&conn, &new_doc("/in/a.pdf", "same", "ACME")).unwrap();
        let err = insert_document(&conn, &new_doc("/in/b.pdf", "same", "ACME")).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(count_documents(&conn).unwrap(), 1);
    }

    #[test]
    fn duplicate_path_is_conflict() {
        let conn = open_memory_database().unwrap();
        insert_document(&conn, &new_doc("/in/a.pdf", "h1", "ACME")).unwrap();
        let err = insert_document(&conn, &new_doc("/in/a.pdf", "h2", "ACME")).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn is_duplicate_tracks_hashes() {
        let conn = open_memory_database().unwrap();
        assert!(!is_duplicate(&conn, "h1").unwrap());
        insert_document(&conn, &new_doc("/in/a.pdf", "h1", "ACME")).unwrap();
        assert!(is_duplicate(&conn, "h1").unwrap());
        assert!(!is_duplicate(&conn, "h2").unwrap());
    }

    #[test]
    fn search_by_client_is_case_insensitive_newest_first() {
        let conn = open_memory_database().unwrap();
        let first = insert_document(&conn, &new_doc("/in/1.pdf", "h1", "ACME")).unwrap();
        let second = insert_document(&conn, &new_doc("/in/2.pdf", "h2", "ACME SANTE")).unwrap();
        insert_document(&conn, &new_doc("/in/3.pdf", "h3", "OTHER")).unwrap();

        let criteria = SearchCriteria {
            client_name: Some("acme".into()),
            ..Default::default()
        };
        let ids: Vec<i64> = search_documents(&conn, &criteria)
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn empty_criteria_returns_recent_documents() {
        let conn = open_memory_database().unwrap();
        for i in 0..3 {
            insert_document(&conn, &new_doc(&format!("/in/{i}.pdf"), &format!("h{i}"), "X"))
                .unwrap();
        }
        let docs = search_documents(&conn, &SearchCriteria::default()).unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].file_path, "/in/2.pdf");
    }

    #[test]
    fn search_respects_page_size() {
        let conn = open_memory_database().unwrap();
        for i in 0..(SEARCH_PAGE_SIZE + 5) {
            insert_document(&conn, &new_doc(&format!("/in/{i}.pdf"), &format!("h{i}"), "X"))
                .unwrap();
        }
        let docs = search_documents(&conn, &SearchCriteria::default()).unwrap();
        assert_eq!(docs.len(), SEARCH_PAGE_SIZE);

        let small = SearchCriteria { limit: Some(2), ..Default::default() };
        assert_eq!(search_documents(&conn, &small).unwrap().len(), 2);
    }

    #[test]
    fn search_by_keyword_and_date_range() {
        let conn = open_memory_database().unwrap();
        let mut early = new_doc("/in/early.pdf", "h1", "ACME");
        early.document_date = NaiveDate::from_ymd_opt(2025, 12, 1).unwrap();
        early.keywords = vec!["facture".into()];
        insert_document(&conn, &early).unwrap();
        insert_document(&conn, &new_doc("/in/late.pdf", "h2", "ACME")).unwrap();

        let by_keyword = SearchCriteria {
            keyword: Some("FACTURE".into()),
            ..Default::default()
        };
        let docs = search_documents(&conn, &by_keyword).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_path, "/in/early.pdf");

        let by_range = SearchCriteria {
            date_from: NaiveDate::from_ymd_opt(2026, 1, 1),
            date_to: NaiveDate::from_ymd_opt(2026, 1, 31),
            ..Default::default()
        };
        let docs = search_documents(&conn, &by_range).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_path, "/in/late.pdf");

        let inclusive = SearchCriteria {
            date_from: NaiveDate::from_ymd_opt(2026, 1, 15),
            date_to: NaiveDate::from_ymd_opt(2026, 1, 15),
            ..Default::default()
        };
        assert_eq!(search_documents(&conn, &inclusive).unwrap().len(), 1);
    }

    #[test]
    fn accented_names_match_regardless_of_case() {
        let conn = open_memory_database().unwrap();
        let mut doc = new_doc("/in/sg.pdf", "h1", "SOCIÉTÉ GÉNÉRALE");
        doc.counterpart_name = "CLINIQUE SAINT-ÉLOI".into();
        insert_document(&conn, &doc).unwrap();
        insert_document(&conn, &new_doc("/in/other.pdf", "h2", "SOCIETE ANONYME")).unwrap();

        let by_client = search_documents(
            &conn,
            &SearchCriteria {
                client_name: Some("société".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_client.len(), 1);
        assert_eq!(by_client[0].client_name, "SOCIÉTÉ GÉNÉRALE");

        let by_counterpart = search_documents(
            &conn,
            &SearchCriteria {
                counterpart_name: Some("Saint-Éloi".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_counterpart.len(), 1);
    }

    #[test]
    fn like_wildcards_in_input_are_literal() {
        let conn = open_memory_database().unwrap();
        insert_document(&conn, &new_doc("/in/a.pdf", "h1", "ACME")).unwrap();
        insert_document(&conn, &new_doc("/in/b.pdf", "h2", "100% SANTE")).unwrap();

        let criteria = SearchCriteria {
            client_name: Some("%".into()),
            ..Default::default()
        };
        let docs = search_documents(&conn, &criteria).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].client_name, "100% SANTE");
    }

    #[test]
    fn combined_criteria_are_conjunctive() {
        let conn = open_memory_database().unwrap();
        let mut facture = new_doc("/in/f.pdf", "h1", "ACME");
        facture.document_type = DocumentType::Facture;
        facture.counterpart_name = "CLINIQUE MODERNE".into();
        insert_document(&conn, &facture).unwrap();
        insert_document(&conn, &new_doc("/in/b.pdf", "h2", "ACME")).unwrap();

        let criteria = SearchCriteria {
            client_name: Some("acme".into()),
            counterpart_name: Some("clinique".into()),
            document_type: Some(DocumentType::Facture),
            ..Default::default()
        };
        let docs = search_documents(&conn, &criteria).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].file_path, "/in/f.pdf");
    }
}
