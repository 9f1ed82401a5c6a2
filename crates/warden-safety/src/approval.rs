use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use warden_core::{ActionRequest, ApprovalOutcome, Event, EventBus};

/// Lifecycle state of an approval ticket.
///
/// `Pending` has exactly four exits; every terminal state is final. A
/// resolved ticket accepts no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Approved,
    Denied,
    TimedOut,
    Cancelled,
}

impl TicketStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TicketStatus::Pending)
    }

    pub fn as_outcome(&self) -> ApprovalOutcome {
        match self {
            TicketStatus::Pending => ApprovalOutcome::NotRequired,
            TicketStatus::Approved => ApprovalOutcome::Approved,
            TicketStatus::Denied => ApprovalOutcome::Denied,
            TicketStatus::TimedOut => ApprovalOutcome::TimedOut,
            TicketStatus::Cancelled => ApprovalOutcome::Cancelled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::Approved => "approved",
            TicketStatus::Denied => "denied",
            TicketStatus::TimedOut => "timed_out",
            TicketStatus::Cancelled => "cancelled",
        }
    }
}

/// The tracked lifecycle object for one human-in-the-loop decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalTicket {
    pub id: Uuid,
    pub request: ActionRequest,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolver_id: Option<String>,
    pub timeout_secs: u64,
}

struct TicketSlot {
    ticket: ApprovalTicket,
    resolve_tx: Option<oneshot::Sender<TicketStatus>>,
    wait_rx: Option<oneshot::Receiver<TicketStatus>>,
}

/// Manages pending approval tickets.
///
/// Exactly one resolution wins per ticket: if the host resolves it and the
/// per-ticket timeout fires concurrently, whichever transition lands first
/// stands and the other is a no-op. Resolved tickets are retained for audit
/// lookups.
pub struct ApprovalBroker {
    tickets: Mutex<HashMap<Uuid, TicketSlot>>,
    events: EventBus,
}

impl ApprovalBroker {
    pub fn new(events: EventBus) -> Arc<Self> {
        Arc::new(Self {
            tickets: Mutex::new(HashMap::new()),
            events,
        })
    }

    /// Create a pending ticket and arm its countdown. The ticket times out
    /// on its own even if nobody ever awaits it.
    pub fn create(self: &Arc<Self>, request: ActionRequest, timeout: Duration) -> Uuid {
        let id = Uuid::new_v4();
        let (resolve_tx, wait_rx) = oneshot::channel();
        let ticket = ApprovalTicket {
            id,
            request,
            status: TicketStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
            resolver_id: None,
            timeout_secs: timeout.as_secs(),
        };

        info!(
            ticket_id = %id,
            kind = %ticket.request.kind,
            timeout_secs = ticket.timeout_secs,
            "created approval ticket"
        );
        let action = ticket.request.kind;
        let reason = ticket.request.reason.clone();

        // Insert before publishing: a subscriber reacting to the event may
        // resolve the ticket from another task, and must find it.
        self.tickets.lock().insert(
            id,
            TicketSlot {
                ticket,
                resolve_tx: Some(resolve_tx),
                wait_rx: Some(wait_rx),
            },
        );
        self.events.publish(Event::ApprovalRequested {
            ticket_id: id,
            action,
            reason,
        });

        let broker = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            broker.resolve(id, TicketStatus::TimedOut, "timeout");
        });

        id
    }

    pub fn approve(&self, id: Uuid, resolver_id: &str) -> bool {
        self.resolve(id, TicketStatus::Approved, resolver_id)
    }

    pub fn deny(&self, id: Uuid, resolver_id: &str) -> bool {
        self.resolve(id, TicketStatus::Denied, resolver_id)
    }

    pub fn cancel(&self, id: Uuid) -> bool {
        self.resolve(id, TicketStatus::Cancelled, "caller")
    }

    /// Attempt a terminal transition. Returns false when the ticket is
    /// unknown or already resolved (idempotent rejection, no double
    /// resolution).
    pub fn resolve(&self, id: Uuid, status: TicketStatus, resolver_id: &str) -> bool {
        debug_assert!(status.is_terminal());
        let tx = {
            let mut tickets = self.tickets.lock();
            let Some(slot) = tickets.get_mut(&id) else {
                return false;
            };
            if slot.ticket.status.is_terminal() {
                debug!(ticket_id = %id, attempted = status.as_str(), "late resolution ignored");
                return false;
            }
            slot.ticket.status = status;
            slot.ticket.resolved_at = Some(Utc::now());
            slot.ticket.resolver_id = Some(resolver_id.to_string());
            slot.resolve_tx.take()
        };

        info!(
            ticket_id = %id,
            status = status.as_str(),
            resolver = resolver_id,
            "approval ticket resolved"
        );
        self.events.publish(Event::ApprovalResolved {
            ticket_id: id,
            status: status.as_str().to_string(),
            resolver_id: resolver_id.to_string(),
        });

        if let Some(tx) = tx {
            // Nobody awaiting is fine — the table already holds the state.
            let _ = tx.send(status);
        }
        true
    }

    /// Suspend until the ticket reaches a terminal state. Only the calling
    /// task suspends; the broker itself never blocks.
    ///
    /// Cancelling `cancel` transitions the ticket to `Cancelled` unless a
    /// concurrent resolution already won, in which case that one stands.
    pub async fn await_resolution(&self, id: Uuid, cancel: CancellationToken) -> TicketStatus {
        let rx = {
            let mut tickets = self.tickets.lock();
            match tickets.get_mut(&id) {
                Some(slot) => {
                    if slot.ticket.status.is_terminal() {
                        return slot.ticket.status;
                    }
                    slot.wait_rx.take()
                }
                None => return TicketStatus::Cancelled,
            }
        };

        let Some(rx) = rx else {
            // A second awaiter — fall back to polling the table state.
            return self.status(id).unwrap_or(TicketStatus::Cancelled);
        };

        tokio::select! {
            res = rx => match res {
                Ok(status) => status,
                Err(_) => self.status(id).unwrap_or(TicketStatus::Cancelled),
            },
            _ = cancel.cancelled() => {
                self.resolve(id, TicketStatus::Cancelled, "caller");
                self.status(id).unwrap_or(TicketStatus::Cancelled)
            }
        }
    }

    pub fn status(&self, id: Uuid) -> Option<TicketStatus> {
        self.tickets.lock().get(&id).map(|s| s.ticket.status)
    }

    /// Full ticket snapshot for audit and host display.
    pub fn get(&self, id: Uuid) -> Option<ApprovalTicket> {
        self.tickets.lock().get(&id).map(|s| s.ticket.clone())
    }

    /// All tickets still awaiting a decision.
    pub fn pending(&self) -> Vec<ApprovalTicket> {
        self.tickets
            .lock()
            .values()
            .filter(|s| s.ticket.status == TicketStatus::Pending)
            .map(|s| s.ticket.clone())
            .collect()
    }
}
