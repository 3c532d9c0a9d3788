use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{TriggerStatus, TriggerType};

/// A unit of downstream work created when a document is indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTrigger {
    pub id: i64,
    pub document_id: i64,
    pub trigger_type: TriggerType,
    pub payload: serde_json::Value,
    pub status: TriggerStatus,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}
