use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::DocumentType;

/// Hard cap on a single search page.
pub const SEARCH_PAGE_SIZE: usize = 100;

/// Typed search criteria for the document index. Every field is optional;
/// an empty criteria set returns the most recent documents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    /// Case-insensitive substring of the client name.
    pub client_name: Option<String>,
    pub document_reference: Option<String>,
    pub counterpart_name: Option<String>,
    /// Exact keyword the document must carry.
    pub keyword: Option<String>,
    pub document_type: Option<DocumentType>,
    /// Inclusive lower bound on the document date.
    pub date_from: Option<NaiveDate>,
    /// Inclusive upper bound on the document date.
    pub date_to: Option<NaiveDate>,
    /// Page size; clamped to [`SEARCH_PAGE_SIZE`].
    pub limit: Option<usize>,
}

impl SearchCriteria {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(SEARCH_PAGE_SIZE)
            .clamp(1, SEARCH_PAGE_SIZE)
    }
}
