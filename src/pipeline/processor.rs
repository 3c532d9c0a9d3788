//! Document processing: hash → dedup → extract → fields → persist.
//!
//! One `process` call handles one file and appends exactly one processing-log
//! entry. The document record, its workflow triggers and the success log entry
//! are written in a single transaction; uniqueness on `content_hash` and
//! `file_path` is enforced by the store, so concurrent workers racing on the
//! same content resolve to one `Processed` and one `Duplicate`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::config;
use crate::db::repository::{
    append_log, create_trigger, get_document_by_hash, get_document_by_path, insert_document,
    now_timestamp,
};
use crate::db::{Database, DatabaseError};
use crate::models::*;
use crate::pipeline::extraction::{ExtractedText, ExtractionError, TextExtractor};
use crate::pipeline::fields::{extract_fields, ExtractedFields};
use crate::pipeline::hash::compute_content_hash;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// The only failure `process` surfaces as an error: the audit trail itself
/// could not be written. Every other failure is a `ProcessingOutcome`.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Failed to write processing log: {0}")]
    AuditLog(#[source] DatabaseError),
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Processed {
        document_id: i64,
        document_type: DocumentType,
        status: DocumentStatus,
        triggers: Vec<TriggerType>,
    },
    /// Same content is already indexed. The id is `None` only when the
    /// winning record could not be read back after a lost insert race.
    Duplicate {
        existing_document_id: Option<i64>,
        content_hash: String,
    },
    /// The path is indexed with different content. Nothing is overwritten.
    PathConflict {
        existing_document_id: i64,
        content_hash: String,
    },
    Failed {
        reason: String,
    },
}

impl ProcessingOutcome {
    pub fn document_id(&self) -> Option<i64> {
        match self {
            Self::Processed { document_id, .. } => Some(*document_id),
            Self::Duplicate { existing_document_id, .. } => *existing_document_id,
            Self::PathConflict { existing_document_id, .. } => Some(*existing_document_id),
            Self::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// Upper bound on one extraction call; past it the document is degraded.
    pub extraction_timeout: Duration,
    /// Maximum live extraction threads, timed-out ones included. When all
    /// are busy the document is degraded without spawning.
    pub extraction_slots: usize,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            extraction_timeout: Duration::from_secs(config::DEFAULT_EXTRACTION_TIMEOUT_SECS),
            extraction_slots: config::DEFAULT_WORKERS,
        }
    }
}

/// Counts live extraction threads against a fixed limit.
struct ExtractionSlots {
    in_flight: AtomicUsize,
    limit: usize,
}

/// Held by an extraction thread until it exits, even by panic.
struct SlotGuard(Arc<ExtractionSlots>);

impl ExtractionSlots {
    fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            limit: limit.max(1),
        })
    }

    fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        self.in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.limit).then_some(n + 1)
            })
            .ok()?;
        Some(SlotGuard(Arc::clone(self)))
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Drives one file through the pipeline. Shared across workers via `Arc`.
pub struct DocumentProcessor {
    db: Arc<Database>,
    extractor: Arc<dyn TextExtractor>,
    options: ProcessorOptions,
    slots: Arc<ExtractionSlots>,
}

/// Extraction result after degradation has been decided.
struct TextOutcome {
    text: String,
    confidence: Option<f32>,
    error: Option<String>,
}

impl DocumentProcessor {
    pub fn new(
        db: Arc<Database>,
        extractor: Arc<dyn TextExtractor>,
        options: ProcessorOptions,
    ) -> Self {
        let slots = ExtractionSlots::new(options.extraction_slots);
        Self {
            db,
            extractor,
            options,
            slots,
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn process(&self, path: &Path) -> Result<ProcessingOutcome, ProcessingError> {
        let path = index_path(path);
        let file_path = path.to_string_lossy().into_owned();

        // Step 1: Hash
        let content_hash = match compute_content_hash(&path) {
            Ok(hash) => hash,
            Err(e) => return self.fail(&file_path, "hash", e.to_string()),
        };

        // Step 2: Duplicate check (fast path; the insert re-checks)
        match self.db.with_conn(|conn| get_document_by_hash(conn, &content_hash)) {
            Ok(Some(existing)) => {
                return self.duplicate(&file_path, content_hash, Some(existing.id));
            }
            Ok(None) => {}
            Err(e) => return self.fail(&file_path, "duplicate_check", e.to_string()),
        }

        // Step 3: Extract text, degrading on any failure
        let text = self.extract_text(&path);

        // Step 4: Business fields
        let fields = extract_fields(&text.text);
        let degraded = text.error.is_some();
        let status = if degraded {
            DocumentStatus::IndexedWithErrors
        } else {
            DocumentStatus::Indexed
        };
        let triggers: Vec<TriggerType> = if degraded {
            Vec::new()
        } else {
            fields.document_type.triggers().to_vec()
        };

        // Step 5: Persist record + triggers + log atomically
        let new_doc = NewDocument {
            file_path: file_path.clone(),
            content_hash: content_hash.clone(),
            client_name: fields.client_name.clone(),
            document_reference: fields.document_reference.clone(),
            counterpart_name: fields.counterpart_name.clone(),
            document_date: fields.document_date,
            keywords: fields.keywords.clone(),
            document_type: fields.document_type,
            status,
            raw_text: text.text,
            extraction_confidence: text.confidence,
            processing_errors: text.error.clone(),
        };

        let persisted = self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let document_id = insert_document(&tx, &new_doc)?;
            for trigger_type in &triggers {
                create_trigger(&tx, document_id, *trigger_type, &trigger_payload(*trigger_type, &fields))?;
            }
            let (action, details) = if degraded {
                (
                    LogAction::ProcessedWithErrors,
                    json!({
                        "document_id": document_id,
                        "document_type": fields.document_type,
                        "content_hash": content_hash,
                        "error": text.error,
                    }),
                )
            } else {
                (
                    LogAction::Processed,
                    json!({
                        "document_id": document_id,
                        "document_type": fields.document_type,
                        "content_hash": content_hash,
                        "triggers": triggers,
                    }),
                )
            };
            append_log(&tx, &NewLogEntry::new(&file_path, action, LogStatus::Success, details))?;
            tx.commit()?;
            Ok(document_id)
        });

        match persisted {
            Ok(document_id) => {
                tracing::info!(
                    document_id,
                    path = %file_path,
                    document_type = fields.document_type.as_str(),
                    status = status.as_str(),
                    triggers = triggers.len(),
                    "Document indexed"
                );
                Ok(ProcessingOutcome::Processed {
                    document_id,
                    document_type: fields.document_type,
                    status,
                    triggers,
                })
            }
            Err(e) if e.is_conflict() => self.resolve_conflict(&file_path, content_hash),
            Err(e) => self.fail(&file_path, "persist", e.to_string()),
        }
    }

    /// Run the extractor on a helper thread, bounded by the extraction timeout.
    /// A timed-out thread keeps its slot until it finishes; its result is discarded.
    fn extract_text(&self, path: &Path) -> TextOutcome {
        let Some(slot) = self.slots.try_acquire() else {
            return degraded_text(
                path,
                ExtractionError::Unavailable(format!(
                    "all {} extraction slots busy",
                    self.slots.limit
                )),
            );
        };
        let timeout = self.options.extraction_timeout;
        let result =
            run_with_timeout(Arc::clone(&self.extractor), path.to_path_buf(), timeout, slot);

        match result {
            Ok(extracted) if !extracted.text.trim().is_empty() => TextOutcome {
                text: extracted.text,
                confidence: extracted.confidence,
                error: None,
            },
            Ok(_) => degraded_text(path, ExtractionError::EmptyText),
            Err(e) => degraded_text(path, e),
        }
    }

    /// The insert lost on a UNIQUE constraint. Same hash means duplicate
    /// content (possibly a concurrent worker); otherwise the path is taken.
    fn resolve_conflict(
        &self,
        file_path: &str,
        content_hash: String,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        match self.db.with_conn(|conn| get_document_by_hash(conn, &content_hash)) {
            Ok(Some(existing)) => {
                return self.duplicate(file_path, content_hash, Some(existing.id));
            }
            Ok(None) => {}
            Err(e) => return self.fail(file_path, "conflict_resolution", e.to_string()),
        }

        match self.db.with_conn(|conn| get_document_by_path(conn, file_path)) {
            Ok(Some(existing)) => {
                tracing::warn!(
                    path = %file_path,
                    existing_document_id = existing.id,
                    "Indexed path now has different content, leaving record unchanged"
                );
                self.log(NewLogEntry::new(
                    file_path,
                    LogAction::PathConflict,
                    LogStatus::Skipped,
                    json!({
                        "existing_document_id": existing.id,
                        "existing_content_hash": existing.content_hash,
                        "content_hash": content_hash,
                    }),
                ))?;
                Ok(ProcessingOutcome::PathConflict {
                    existing_document_id: existing.id,
                    content_hash,
                })
            }
            Ok(None) => self.duplicate(file_path, content_hash, None),
            Err(e) => self.fail(file_path, "conflict_resolution", e.to_string()),
        }
    }

    fn duplicate(
        &self,
        file_path: &str,
        content_hash: String,
        existing_document_id: Option<i64>,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        tracing::info!(
            path = %file_path,
            existing_document_id = ?existing_document_id,
            "Duplicate content, skipping"
        );
        self.log(NewLogEntry::new(
            file_path,
            LogAction::Duplicate,
            LogStatus::Skipped,
            json!({
                "content_hash": content_hash,
                "existing_document_id": existing_document_id,
            }),
        ))?;
        Ok(ProcessingOutcome::Duplicate {
            existing_document_id,
            content_hash,
        })
    }

    fn fail(
        &self,
        file_path: &str,
        stage: &str,
        reason: String,
    ) -> Result<ProcessingOutcome, ProcessingError> {
        tracing::error!(path = %file_path, stage, error = %reason, "Document processing failed");
        self.log(NewLogEntry::new(
            file_path,
            LogAction::Error,
            LogStatus::Failed,
            json!({ "stage": stage, "error": reason }),
        ))?;
        Ok(ProcessingOutcome::Failed { reason })
    }

    fn log(&self, entry: NewLogEntry) -> Result<(), ProcessingError> {
        self.db
            .with_conn(|conn| append_log(conn, &entry))
            .map(|_| ())
            .map_err(|e| {
                tracing::error!(path = %entry.file_path, error = %e, "Processing log write failed");
                ProcessingError::AuditLog(e)
            })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Paths are indexed in canonical form so the same file seen through
/// different relative paths maps to one record.
fn index_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn run_with_timeout(
    extractor: Arc<dyn TextExtractor>,
    path: PathBuf,
    timeout: Duration,
    slot: SlotGuard,
) -> Result<ExtractedText, ExtractionError> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("ged-extract".into())
        .spawn(move || {
            // Release before reporting so the next caller finds the slot free.
            let slot = slot;
            let result = extractor.extract(&path);
            drop(slot);
            let _ = tx.send(result);
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(ExtractionError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(ExtractionError::Unavailable(
            "extractor exited without a result".into(),
        )),
    }
}

fn degraded_text(path: &Path, error: ExtractionError) -> TextOutcome {
    tracing::warn!(
        path = %path.display(),
        error = %error,
        "Text extraction degraded, indexing with errors"
    );
    TextOutcome {
        text: String::new(),
        confidence: None,
        error: Some(error.to_string()),
    }
}

/// Payload handed to the workflow executor for each trigger type.
pub fn trigger_payload(trigger_type: TriggerType, fields: &ExtractedFields) -> serde_json::Value {
    match trigger_type {
        TriggerType::AutoAssignment => json!({
            "document_reference": fields.document_reference,
            "client_name": fields.client_name,
            "priority": "normal",
        }),
        TriggerType::SlaMonitoring => json!({
            "document_type": fields.document_type,
            "client_name": fields.client_name,
            "start_date": now_timestamp(),
        }),
        TriggerType::ComplaintProcessing => json!({
            "client_name": fields.client_name,
            "priority": "high",
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
