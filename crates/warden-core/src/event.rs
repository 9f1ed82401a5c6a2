use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::action::ActionKind;

/// Events flowing out of the gateway — hosts subscribe instead of being
/// called back from deep inside the dispatch path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    // ── Action lifecycle ───────────────────────────────────────
    ActionSubmitted {
        request_id: Uuid,
        action: ActionKind,
        requester_id: String,
    },
    ActionExecuted {
        request_id: Uuid,
        action: ActionKind,
    },
    ActionBlocked {
        request_id: Uuid,
        action: ActionKind,
        reason: String,
    },

    // ── Approval lifecycle ─────────────────────────────────────
    ApprovalRequested {
        ticket_id: Uuid,
        action: ActionKind,
        reason: String,
    },
    ApprovalResolved {
        ticket_id: Uuid,
        status: String,
        resolver_id: String,
    },

    // ── Budget lifecycle ───────────────────────────────────────
    BudgetWarning {
        remaining_fraction: f64,
    },
    BudgetDayRolledOver {
        day_key: NaiveDate,
    },
}

/// A broadcast-based event bus for system-wide pub/sub.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<Event>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: Event) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
