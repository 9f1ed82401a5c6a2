use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use warden_core::{
    ActionRequest, ActionResult, ApprovalOutcome, BlockReason, BudgetOutcome, Event, EventBus,
    Notifier,
};
use warden_config::WardenConfig;
use warden_safety::{
    ApprovalBroker, BudgetLedger, GuardrailEngine, GuardrailVerdict, LedgerStore, PolicyRuleSet,
    Reservation, ReserveOutcome, TicketStatus, Tier,
};

use crate::audit::{AuditEntry, AuditLog, FinalOutcome};
use crate::registry::CapabilityRegistry;

/// The façade every producer talks to.
///
/// `submit` pipelines a request through tier classification, the budget
/// ledger, capability resolution, the approval broker, and dispatch.
/// Unrelated requests never serialize: the only shared mutable state lives
/// inside the ledger and the ticket table, each internally atomic, and the
/// approval wait suspends only the submitting task.
pub struct Gateway {
    policy: PolicyRuleSet,
    guardrails: GuardrailEngine,
    ledger: Arc<BudgetLedger>,
    broker: Arc<ApprovalBroker>,
    // Hot reload = swap the whole registry behind the pointer, never
    // mutate handlers in place under concurrent dispatch.
    registry: RwLock<Arc<CapabilityRegistry>>,
    audit: Arc<AuditLog>,
    notifier: Arc<dyn Notifier>,
    events: EventBus,
    approval_timeout: Duration,
}

impl Gateway {
    pub fn new(
        policy: PolicyRuleSet,
        ledger: Arc<BudgetLedger>,
        broker: Arc<ApprovalBroker>,
        registry: CapabilityRegistry,
        notifier: Arc<dyn Notifier>,
        events: EventBus,
        approval_timeout: Duration,
    ) -> Self {
        Self {
            policy,
            guardrails: GuardrailEngine::default(),
            ledger,
            broker,
            registry: RwLock::new(Arc::new(registry)),
            audit: Arc::new(AuditLog::new()),
            notifier,
            events,
            approval_timeout,
        }
    }

    /// Install the content denylist. Without this the engine approves
    /// everything.
    pub fn with_guardrails(mut self, guardrails: GuardrailEngine) -> Self {
        self.guardrails = guardrails;
        self
    }

    /// Wire a gateway from a validated config: policy, ledger (with its
    /// persistent log when configured), and broker all share one event bus.
    pub fn from_config(
        config: &WardenConfig,
        registry: CapabilityRegistry,
        notifier: Arc<dyn Notifier>,
    ) -> warden_core::Result<Self> {
        let events = EventBus::default();
        let policy = PolicyRuleSet::from_config(config)?;
        let mut ledger = BudgetLedger::new(
            config.budget.daily_cap_usd,
            config.budget.utc_offset_hours,
            config.budget.low_water_fraction,
            events.clone(),
        );
        if let Some(path) = &config.budget.ledger_path {
            ledger = ledger.with_store(LedgerStore::open(path)?)?;
        }
        let broker = ApprovalBroker::new(events.clone());
        Ok(Self::new(
            policy,
            Arc::new(ledger),
            broker,
            registry,
            notifier,
            events,
            Duration::from_secs(config.approval.timeout_secs),
        )
        .with_guardrails(GuardrailEngine::from_config(config)))
    }

    /// Submit an action and wait for its terminal outcome.
    pub async fn submit(&self, request: ActionRequest) -> ActionResult {
        self.submit_cancellable(request, CancellationToken::new())
            .await
    }

    /// Like [`Gateway::submit`], but the caller can abandon its own pending
    /// approval wait (e.g. producer shutdown). Cancellation transitions the
    /// ticket to `Cancelled` and releases any budget reservation — nothing
    /// is left orphaned or permanently held.
    pub async fn submit_cancellable(
        &self,
        request: ActionRequest,
        cancel: CancellationToken,
    ) -> ActionResult {
        let tier = self.policy.classify(request.kind);
        info!(
            request_id = %request.id,
            kind = %request.kind,
            tier = %tier,
            requester = %request.requester_id,
            "action submitted"
        );
        self.events.publish(Event::ActionSubmitted {
            request_id: request.id,
            action: request.kind,
            requester_id: request.requester_id.clone(),
        });

        // Guardrails come first: approval cannot whitewash a denylisted
        // parameter, so the check precedes every other leg.
        if let GuardrailVerdict::Deny(detail) = self.guardrails.evaluate(&request) {
            return self.block(
                &request,
                tier,
                BudgetOutcome::NotApplicable,
                ApprovalOutcome::NotRequired,
                BlockReason::GuardrailViolation { detail },
                None,
            );
        }

        // Budget leg. A rejection is not fatal: it downgrades to the
        // fallback lane when one is registered.
        let mut budget_outcome = BudgetOutcome::NotApplicable;
        let mut reservation: Option<Reservation> = None;
        let mut use_fallback = false;
        if let Some(cost) = request.estimated_cost_usd {
            match self
                .ledger
                .reserve(cost, &request.requester_id, request.kind)
            {
                ReserveOutcome::Admitted {
                    reservation: r,
                    remaining_fraction,
                    crossed_low_water,
                } => {
                    budget_outcome = BudgetOutcome::Charged;
                    reservation = Some(r);
                    if crossed_low_water {
                        let notifier = Arc::clone(&self.notifier);
                        tokio::spawn(async move {
                            notifier.notify_budget_warning(remaining_fraction).await;
                        });
                    }
                }
                ReserveOutcome::Rejected {
                    needed_usd,
                    remaining_usd,
                } => {
                    budget_outcome = BudgetOutcome::Rejected;
                    if self.registry().fallback(request.kind).is_some() {
                        use_fallback = true;
                    } else {
                        return self.block(
                            &request,
                            tier,
                            budget_outcome,
                            ApprovalOutcome::NotRequired,
                            BlockReason::BudgetExceeded {
                                needed_usd,
                                remaining_usd,
                            },
                            None,
                        );
                    }
                }
            }
        }

        // Resolve the handler before any approval wait: a registration gap
        // blocks immediately regardless of tier and never wastes a human
        // decision.
        let handler = if use_fallback {
            self.registry().fallback(request.kind)
        } else {
            self.registry().resolve(request.kind)
        };
        let Some(handler) = handler else {
            if let Some(r) = reservation.take() {
                self.ledger.release(r);
            }
            return self.block(
                &request,
                tier,
                budget_outcome,
                ApprovalOutcome::NotRequired,
                BlockReason::UnknownCapability { kind: request.kind },
                None,
            );
        };

        // Approval leg. Reservation precedes the wait and is refunded on
        // every non-approval terminal state, so spend is only permanently
        // consumed by an executed action.
        let mut approval_outcome = ApprovalOutcome::NotRequired;
        if tier.requires_approval() {
            let ticket_id = self.broker.create(request.clone(), self.approval_timeout);
            {
                let notifier = Arc::clone(&self.notifier);
                let req = request.clone();
                let timeout = self.approval_timeout;
                tokio::spawn(async move {
                    notifier.request_approval(ticket_id, req, timeout).await;
                });
            }
            let status = self.broker.await_resolution(ticket_id, cancel).await;
            approval_outcome = status.as_outcome();
            if status != TicketStatus::Approved {
                if let Some(r) = reservation.take() {
                    self.ledger.release(r);
                }
                return self.block(
                    &request,
                    tier,
                    budget_outcome,
                    approval_outcome,
                    BlockReason::ApprovalRefused {
                        outcome: approval_outcome,
                    },
                    None,
                );
            }
        }

        // Dispatch. Handler errors are caught and reported, never
        // propagated raw to the producer.
        match handler.execute(&request).await {
            Ok(output) => {
                if tier.notifies() {
                    let notifier = Arc::clone(&self.notifier);
                    let req = request.clone();
                    tokio::spawn(async move {
                        notifier.notify_post_hoc(req).await;
                    });
                }
                self.record(
                    &request,
                    tier,
                    budget_outcome,
                    approval_outcome,
                    FinalOutcome::Executed,
                    None,
                );
                self.events.publish(Event::ActionExecuted {
                    request_id: request.id,
                    action: request.kind,
                });
                ActionResult::Executed { output }
            }
            Err(e) => {
                if let Some(r) = reservation.take() {
                    self.ledger.release(r);
                }
                let detail = e.to_string();
                self.block(
                    &request,
                    tier,
                    budget_outcome,
                    approval_outcome,
                    BlockReason::HandlerFailure {
                        detail: detail.clone(),
                    },
                    Some(detail),
                )
            }
        }
    }

    fn block(
        &self,
        request: &ActionRequest,
        tier: Tier,
        budget_outcome: BudgetOutcome,
        approval_outcome: ApprovalOutcome,
        reason: BlockReason,
        handler_error: Option<String>,
    ) -> ActionResult {
        warn!(request_id = %request.id, kind = %request.kind, %reason, "action blocked");
        self.record(
            request,
            tier,
            budget_outcome,
            approval_outcome,
            FinalOutcome::Blocked,
            handler_error,
        );
        self.events.publish(Event::ActionBlocked {
            request_id: request.id,
            action: request.kind,
            reason: reason.to_string(),
        });
        ActionResult::Blocked { reason }
    }

    fn record(
        &self,
        request: &ActionRequest,
        tier: Tier,
        budget_outcome: BudgetOutcome,
        approval_outcome: ApprovalOutcome,
        final_outcome: FinalOutcome,
        handler_error: Option<String>,
    ) {
        self.audit.append(AuditEntry {
            request_id: request.id,
            requester_id: request.requester_id.clone(),
            kind: request.kind,
            tier,
            budget_outcome,
            approval_outcome,
            final_outcome,
            handler_error,
            timestamp: Utc::now(),
        });
    }

    /// The live registry. Dispatch clones the pointer, so a concurrent
    /// swap never tears an in-flight request.
    pub fn registry(&self) -> Arc<CapabilityRegistry> {
        Arc::clone(&self.registry.read())
    }

    /// Replace the registry wholesale.
    pub fn replace_registry(&self, registry: CapabilityRegistry) {
        *self.registry.write() = Arc::new(registry);
        info!("capability registry replaced");
    }

    pub fn audit(&self) -> Arc<AuditLog> {
        Arc::clone(&self.audit)
    }

    pub fn ledger(&self) -> Arc<BudgetLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn broker(&self) -> Arc<ApprovalBroker> {
        Arc::clone(&self.broker)
    }

    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    pub fn policy(&self) -> &PolicyRuleSet {
        &self.policy
    }
}
