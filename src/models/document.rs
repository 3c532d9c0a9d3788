use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{DocumentStatus, DocumentType};

/// Placeholder for business fields the extractor could not find.
pub const UNKNOWN: &str = "UNKNOWN";

/// One ingested physical file, as persisted in the document index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub file_path: String,
    pub content_hash: String,
    pub client_name: String,
    pub document_reference: String,
    pub counterpart_name: String,
    pub document_date: NaiveDate,
    pub keywords: Vec<String>,
    pub document_type: DocumentType,
    pub status: DocumentStatus,
    pub raw_text: String,
    pub extraction_confidence: Option<f32>,
    pub processing_errors: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a document; the store assigns `id` and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub file_path: String,
    pub content_hash: String,
    pub client_name: String,
    pub document_reference: String,
    pub counterpart_name: String,
    pub document_date: NaiveDate,
    pub keywords: Vec<String>,
    pub document_type: DocumentType,
    pub status: DocumentStatus,
    pub raw_text: String,
    pub extraction_confidence: Option<f32>,
    pub processing_errors: Option<String>,
}
