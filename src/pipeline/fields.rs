//! Business-field extraction from raw document text.
//!
//! Pure functions: no I/O, no clock access except through [`extract_fields`],
//! which supplies today's date as the fallback document date.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{DocumentType, UNKNOWN};

/// Terms recorded as keywords when they occur anywhere in the text.
pub const KEYWORD_TERMS: &[&str] = &[
    "bordereau",
    "facture",
    "remboursement",
    "client",
    "prestataire",
    "rib",
    "virement",
    "réclamation",
    "bulletin",
];

const ACME_CLIENT: &str = "ACME ASSURANCE";
const CLINIQUE_COUNTERPART: &str = "CLINIQUE MODERNE";

static REFERENCE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bb-\d{4}-\d+").unwrap());

/// DD/MM/YYYY | DD-MM-YYYY | YYYY-MM-DD, in that group order.
static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:(\d{2})/(\d{2})/(\d{4})|(\d{2})-(\d{2})-(\d{4})|(\d{4})-(\d{2})-(\d{2}))\b",
    )
    .unwrap()
});

static BULLETIN_SOIN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)bulletins?\s+de\s+soins?").unwrap());

static BS_TOKEN_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bBS\b").unwrap());

/// Business fields found in a document's text. Missing fields hold `UNKNOWN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub client_name: String,
    pub document_reference: String,
    pub counterpart_name: String,
    pub document_date: NaiveDate,
    /// Sorted, deduplicated.
    pub keywords: Vec<String>,
    pub document_type: DocumentType,
}

pub fn extract_fields(text: &str) -> ExtractedFields {
    extract_fields_on(text, Utc::now().date_naive())
}

/// Extract fields, using `today` when no date is present in the text.
pub fn extract_fields_on(text: &str, today: NaiveDate) -> ExtractedFields {
    let lower = text.to_lowercase();

    ExtractedFields {
        client_name: client_name(text, &lower),
        document_reference: document_reference(text),
        counterpart_name: counterpart_name(text, &lower),
        document_date: first_date(text).unwrap_or(today),
        keywords: keywords(&lower),
        document_type: classify(text, &lower),
    }
}

fn client_name(text: &str, lower: &str) -> String {
    if lower.contains("acme") {
        return ACME_CLIENT.to_string();
    }
    labelled_value(text, &["client:"]).unwrap_or_else(|| UNKNOWN.to_string())
}

fn document_reference(text: &str) -> String {
    if let Some(value) = labelled_value(text, &["référence:", "reference:"]) {
        return value;
    }
    REFERENCE_PATTERN
        .find(text)
        .map(|m| m.as_str().to_uppercase())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn counterpart_name(text: &str, lower: &str) -> String {
    if let Some(value) = labelled_value(text, &["prestataire:"]) {
        return value;
    }
    if lower.contains("clinique") {
        return CLINIQUE_COUNTERPART.to_string();
    }
    UNKNOWN.to_string()
}

/// Value after the first `:` on the first line carrying one of `labels`.
/// A label line with nothing after the colon counts as a match with no value.
fn labelled_value(text: &str, labels: &[&str]) -> Option<String> {
    let line = text.lines().find(|line| {
        let lower = line.to_lowercase();
        labels.iter().any(|label| lower.contains(label))
    })?;
    let value = line.split_once(':').map(|(_, rest)| rest.trim()).unwrap_or("");
    Some(if value.is_empty() {
        UNKNOWN.to_string()
    } else {
        value.to_string()
    })
}

fn first_date(text: &str) -> Option<NaiveDate> {
    DATE_PATTERN.captures_iter(text).find_map(|caps| {
        let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        let (year, month, day) = if caps.get(1).is_some() {
            (num(3)?, num(2)?, num(1)?)
        } else if caps.get(4).is_some() {
            (num(6)?, num(5)?, num(4)?)
        } else {
            (num(7)?, num(8)?, num(9)?)
        };
        NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
    })
}

fn keywords(lower: &str) -> Vec<String> {
    KEYWORD_TERMS
        .iter()
        .filter(|term| lower.contains(*term))
        .map(|term| term.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn classify(text: &str, lower: &str) -> DocumentType {
    if lower.contains("bordereau") {
        DocumentType::Bordereau
    } else if lower.contains("facture") {
        DocumentType::Facture
    } else if lower.contains("réclamation") || lower.contains("reclamation") {
        DocumentType::Reclamation
    } else if BULLETIN_SOIN_PATTERN.is_match(text) || BS_TOKEN_PATTERN.is_match(text) {
        DocumentType::BulletinSoin
    } else {
        DocumentType::DocumentGeneral
    }
}
