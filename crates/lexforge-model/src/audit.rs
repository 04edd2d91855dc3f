//! Append-only audit trail of pipeline actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Import,
    SubmissionCreated,
    ResolveStarted,
    ApplyStarted,
    Commit,
    TargetDeleted,
    DocumentDeleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: u64,
    pub action: AuditAction,
    /// Entity kind the action touched ("document", "submission", "snapshot").
    pub entity_kind: String,
    pub entity_id: u64,
    pub created_at: DateTime<Utc>,
}
