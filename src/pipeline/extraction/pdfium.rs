//! Digital PDF text extraction via Google PDFium.
//!
//! Reads the embedded text layer only; scanned PDFs without a text layer come
//! back as `EmptyText` and the document is indexed with errors.
//!
//! `PdfiumTextExtractor` is stateless (`Send + Sync`). Each call creates a
//! fresh `Pdfium` instance; the OS caches the library load.

use std::path::Path;

use pdfium_render::prelude::*;
use tracing::debug;

use super::plain_text::PlainTextExtractor;
use super::sanitize::sanitize_extracted_text;
use super::{ExtractedText, ExtractionError, TextExtractor};

/// Native text layers are reliable; OCR output would report lower.
const PDF_TEXT_LAYER_CONFIDENCE: f32 = 0.95;

pub struct PdfiumTextExtractor;

impl PdfiumTextExtractor {
    /// Verify the PDFium library is loadable at construction time.
    pub fn new() -> Result<Self, ExtractionError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Load the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path)
/// 2. Alongside the running executable, or in `<exe_dir>/pdfium/lib`
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractionError::Unavailable(format!("Failed to load PDFium from {path}: {e}"))
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let candidates = [exe_dir.to_path_buf(), exe_dir.join("pdfium").join("lib")];
            for dir in &candidates {
                let lib_path =
                    Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
                if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                    debug!(dir = %dir.display(), "Loaded PDFium from candidate directory");
                    return Ok(Pdfium::new(bindings));
                }
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| {
        ExtractionError::Unavailable(format!(
            "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
        ))
    })?;
    Ok(Pdfium::new(bindings))
}

/// Encrypted PDFs get their own message; everything else is a parse failure.
fn map_load_error(e: PdfiumError) -> ExtractionError {
    let msg = e.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ExtractionError::Pdf("PDF is password-protected".into())
    } else {
        ExtractionError::Pdf(format!("Failed to load PDF: {msg}"))
    }
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

impl TextExtractor for PdfiumTextExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractionError> {
        if !is_pdf(path) {
            return PlainTextExtractor.extract(path);
        }

        let bytes = std::fs::read(path)?;
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(&bytes, None)
            .map_err(map_load_error)?;

        let page_count = document.pages().len();
        let raw = document
            .pages()
            .iter()
            .map(|page| page.text().map(|t| t.all()).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\n");

        let text = sanitize_extracted_text(&raw);
        if text.is_empty() {
            return Err(ExtractionError::EmptyText);
        }

        debug!(
            path = %path.display(),
            pages = page_count,
            text_length = text.len(),
            "PdfiumTextExtractor: extraction complete"
        );

        Ok(ExtractedText {
            text,
            confidence: Some(PDF_TEXT_LAYER_CONFIDENCE),
        })
    }
}
