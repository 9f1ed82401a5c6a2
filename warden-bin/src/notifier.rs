use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use warden_core::{ActionRequest, Event, EventBus, Notifier};
use warden_safety::ApprovalBroker;

/// Terminal implementation of the gateway's notifier interface. Approval
/// prompts block a dedicated blocking task, never the dispatch path, and
/// resolve the ticket back through the broker. The prompt races the
/// ticket's own resolution, so a timed-out or remotely resolved ticket
/// does not leave the host waiting on a decision that no longer counts.
pub struct CliNotifier {
    broker: Arc<ApprovalBroker>,
    events: EventBus,
}

impl CliNotifier {
    pub fn new(broker: Arc<ApprovalBroker>, events: EventBus) -> Self {
        Self { broker, events }
    }
}

/// Wait until the bus reports the ticket resolved; returns the terminal
/// status name. Used to abandon a stale approval prompt.
async fn resolved_externally(events: &EventBus, ticket_id: Uuid) -> String {
    let mut rx = events.subscribe();
    loop {
        match rx.recv().await {
            Ok(Event::ApprovalResolved {
                ticket_id: id,
                status,
                ..
            }) if id == ticket_id => return status,
            Ok(_) => continue,
            // Lagged receiver; the sender lives as long as self.events.
            Err(_) => continue,
        }
    }
}

#[async_trait]
impl Notifier for CliNotifier {
    async fn notify_post_hoc(&self, request: ActionRequest) {
        println!(
            "▸ executed ({}): {} — {}",
            request.kind, request.requester_id, request.reason
        );
    }

    async fn request_approval(&self, ticket_id: Uuid, request: ActionRequest, timeout: Duration) {
        let broker = Arc::clone(&self.broker);
        let prompt = format!(
            "Approve {}({}) for '{}'? Reason: {} (auto-deny in {}s)",
            request.kind,
            request.params,
            request.requester_id,
            request.reason,
            timeout.as_secs(),
        );

        let mut decision = tokio::task::spawn_blocking(move || {
            dialoguer::Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
        });

        tokio::select! {
            decision = &mut decision => match decision {
                Ok(Ok(true)) => {
                    broker.approve(ticket_id, "cli_user");
                }
                Ok(Ok(false)) => {
                    broker.deny(ticket_id, "cli_user");
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "approval prompt failed, leaving ticket to time out");
                }
                Err(e) => {
                    warn!(error = %e, "approval prompt task failed, leaving ticket to time out");
                }
            },
            status = resolved_externally(&self.events, ticket_id) => {
                // The blocking thread still owns stdin until a key is
                // pressed; tell the user why their answer will be ignored.
                eprintln!("ticket already {status}; press enter to dismiss the prompt");
            }
        }
    }

    async fn notify_budget_warning(&self, remaining_fraction: f64) {
        eprintln!(
            "⚠ budget warning: {:.0}% of today's cap remaining",
            remaining_fraction * 100.0
        );
    }
}
