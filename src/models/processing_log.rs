use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{LogAction, LogStatus};

/// One processing attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingLogEntry {
    pub id: i64,
    pub file_path: String,
    pub action: LogAction,
    pub status: LogStatus,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub file_path: String,
    pub action: LogAction,
    pub status: LogStatus,
    pub details: serde_json::Value,
}

impl NewLogEntry {
    pub fn new(
        file_path: impl Into<String>,
        action: LogAction,
        status: LogStatus,
        details: serde_json::Value,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            action,
            status,
            details,
        }
    }
}
