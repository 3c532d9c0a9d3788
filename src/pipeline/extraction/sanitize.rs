/// Punctuation kept in extracted text, beyond letters, digits and whitespace.
/// Covers amounts, references, dates and French typography.
const ALLOWED_PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '-', '/', '(', ')', '[', ']', '+', '=', '%', '#', '@', '&', '\'', '"',
    '!', '?', '*', '_', '°', '«', '»', '€', '\u{2013}', '\u{2014}', '\u{2018}', '\u{2019}',
    '\u{201C}', '\u{201D}',
];

/// Clean extracted text before field extraction.
/// Drops control characters and stray symbols, trims each line, removes blank lines.
pub fn sanitize_extracted_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || ALLOWED_PUNCTUATION.contains(c))
        .collect::<String>()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_control_characters() {
        let raw = "Client:\x00 ACME\x01\x02\nDate: 15/01/2024";
        let clean = sanitize_extracted_text(raw);
        assert_eq!(clean, "Client: ACME\nDate: 15/01/2024");
    }

    #[test]
    fn keeps_references_and_amounts() {
        let raw = "Référence: B-2024-001 | Montant: 1 250,50€ (TTC)";
        let clean = sanitize_extracted_text(raw);
        assert!(clean.contains("B-2024-001"));
        assert!(clean.contains("1 250,50€"));
        assert!(clean.contains("(TTC)"));
        assert!(!clean.contains('|'));
    }

    #[test]
    fn collapses_blank_lines_and_trims() {
        let raw = "  BORDEREAU  \n\n\n  Prestataire: X  \n\n";
        assert_eq!(sanitize_extracted_text(raw), "BORDEREAU\nPrestataire: X");
    }

    #[test]
    fn keeps_french_typography() {
        let raw = "L\u{2019}assuré a dit «remboursement urgent» \u{2014} réclamation";
        let clean = sanitize_extracted_text(raw);
        assert!(clean.contains('\u{2019}'));
        assert!(clean.contains("«remboursement urgent»"));
        assert!(clean.contains('\u{2014}'));
        assert!(clean.contains("réclamation"));
    }

    #[test]
    fn empty_and_control_only_inputs() {
        assert_eq!(sanitize_extracted_text(""), "");
        assert_eq!(sanitize_extracted_text("\x00\x01\x02"), "");
    }
}
