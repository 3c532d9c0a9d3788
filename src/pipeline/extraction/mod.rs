//! Text extraction boundary.
//!
//! OCR and PDF parsing are external capabilities; the pipeline only sees the
//! [`TextExtractor`] trait. Built-ins cover plain UTF-8 files and, with the
//! `pdfium` feature, the native text layer of digital PDFs.

pub mod plain_text;
pub mod sanitize;

#[cfg(feature = "pdfium")]
pub mod pdfium;

pub use plain_text::*;
pub use sanitize::*;

#[cfg(feature = "pdfium")]
pub use pdfium::*;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Text encoding error: {0}")]
    Encoding(String),

    #[error("No text could be extracted")]
    EmptyText,

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("Extraction backend unavailable: {0}")]
    Unavailable(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Text recovered from a document, with the extractor's own confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedText {
    pub text: String,
    pub confidence: Option<f32>,
}

/// Text extraction abstraction (allows mocking for tests).
///
/// Implementations may block; the processor runs them on a helper thread
/// bounded by its extraction timeout.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractionError>;
}

/// The best extractor available in this build.
///
/// With the `pdfium` feature, PDFs go through PDFium when the library can be
/// loaded; otherwise every file is read as plain text.
pub fn default_extractor() -> Arc<dyn TextExtractor> {
    #[cfg(feature = "pdfium")]
    match PdfiumTextExtractor::new() {
        Ok(extractor) => return Arc::new(extractor),
        Err(e) => {
            tracing::warn!(error = %e, "PDFium unavailable, falling back to plain text extraction");
        }
    }
    Arc::new(PlainTextExtractor)
}
