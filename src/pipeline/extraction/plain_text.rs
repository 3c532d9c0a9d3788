use std::path::Path;

use super::sanitize::sanitize_extracted_text;
use super::{ExtractedText, ExtractionError, TextExtractor};

/// Confidence reported for text read directly from a UTF-8 file.
const PLAIN_TEXT_CONFIDENCE: f32 = 0.99;

/// Reads the file as UTF-8 text. Always available; used for text exports
/// and as the fallback when no PDF backend is present.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractionError> {
        let bytes = std::fs::read(path)?;
        let raw =
            String::from_utf8(bytes).map_err(|e| ExtractionError::Encoding(e.to_string()))?;

        let text = sanitize_extracted_text(&raw);
        if text.is_empty() {
            return Err(ExtractionError::EmptyText);
        }

        tracing::debug!(
            path = %path.display(),
            text_length = text.len(),
            "PlainTextExtractor: extraction complete"
        );

        Ok(ExtractedText {
            text,
            confidence: Some(PLAIN_TEXT_CONFIDENCE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_sanitizes_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facture.pdf");
        std::fs::write(&path, "FACTURE\x00 n° 12\n\nClient: Mutuelle Sud").unwrap();

        let result = PlainTextExtractor.extract(&path).unwrap();
        assert_eq!(result.text, "FACTURE n° 12\nClient: Mutuelle Sud");
        assert_eq!(result.confidence, Some(PLAIN_TEXT_CONFIDENCE));
    }

    #[test]
    fn binary_content_is_encoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, [0x25, 0x50, 0x44, 0x46, 0xFF, 0xFE, 0x00]).unwrap();

        let result = PlainTextExtractor.extract(&path);
        assert!(matches!(result, Err(ExtractionError::Encoding(_))));
    }

    #[test]
    fn blank_file_is_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blank.pdf");
        std::fs::write(&path, "  \n\n\t").unwrap();

        assert!(matches!(
            PlainTextExtractor.extract(&path),
            Err(ExtractionError::EmptyText)
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = PlainTextExtractor.extract(&dir.path().join("gone.pdf"));
        assert!(matches!(result, Err(ExtractionError::Io(_))));
    }
}
