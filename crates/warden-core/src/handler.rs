use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::action::{ActionRequest, HandlerOutput};

/// Trait implemented by anything that can execute a kind of action.
///
/// One handler per [`crate::ActionKind`], registered exactly once at
/// startup. Errors returned here are caught by the gateway and reported as
/// a `Blocked` outcome — they never reach the producer raw.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    /// Short name for logs and audit detail.
    fn name(&self) -> &str;

    async fn execute(&self, request: &ActionRequest) -> crate::Result<HandlerOutput>;
}

/// The host surface the gateway talks to. Implemented by a UI or CLI.
///
/// All three calls are fire-and-forget from the gateway's perspective: a
/// notifier that errors or hangs never blocks or reverses an action. For
/// approvals the host resolves the ticket later through the broker.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// An action in the notify tier already executed; tell the user.
    async fn notify_post_hoc(&self, request: ActionRequest);

    /// A ticket is pending; surface it so a human can approve or deny
    /// before `timeout` elapses.
    async fn request_approval(&self, ticket_id: Uuid, request: ActionRequest, timeout: Duration);

    /// Remaining daily budget crossed the configured low-water mark.
    async fn notify_budget_warning(&self, remaining_fraction: f64);
}

/// A notifier that drops everything — for headless producers and tests.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify_post_hoc(&self, _request: ActionRequest) {}

    async fn request_approval(&self, _ticket_id: Uuid, _request: ActionRequest, _timeout: Duration) {
    }

    async fn notify_budget_warning(&self, _remaining_fraction: f64) {}
}
