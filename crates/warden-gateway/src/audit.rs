use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_core::{ActionKind, ApprovalOutcome, BudgetOutcome};
use warden_safety::Tier;

/// Did the action ultimately run?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalOutcome {
    Executed,
    Blocked,
}

/// One gateway decision, summarizing every leg of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub request_id: Uuid,
    pub requester_id: String,
    pub kind: ActionKind,
    pub tier: Tier,
    pub budget_outcome: BudgetOutcome,
    pub approval_outcome: ApprovalOutcome,
    pub final_outcome: FinalOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only record of every gateway decision.
///
/// Entries are ordered by completion, not submission — concurrent submits
/// land in whatever order they reach a terminal state. Shared by reference
/// for reads only.
#[derive(Default)]
pub struct AuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: AuditEntry) {
        self.entries.write().push(entry);
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Entries within a time range and/or for a single requester.
    pub fn filter(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        requester_id: Option<&str>,
    ) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| from.is_none_or(|f| e.timestamp >= f))
            .filter(|e| to.is_none_or(|t| e.timestamp <= t))
            .filter(|e| requester_id.is_none_or(|r| e.requester_id == r))
            .cloned()
            .collect()
    }
}
