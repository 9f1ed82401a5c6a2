use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

use warden_safety::{BudgetLedger, Clock};

/// Settable clock so rollover behavior is testable across midnight.
struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn at(rfc3339: &str) -> Arc<Self> {
        Arc::new(Self(Mutex::new(parse(rfc3339))))
    }

    fn set(&self, rfc3339: &str) {
        *self.0.lock() = parse(rfc3339);
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

fn parse(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

fn ledger_at(cap: f64, offset_hours: i8, clock: Arc<ManualClock>) -> BudgetLedger {
    BudgetLedger::with_clock(
        cap,
        offset_hours,
        0.2,
        warden_core::EventBus::default(),
        clock,
    )
}

#[cfg(test)]
mod tests {
    // ── Tiers and policy ───────────────────────────────────────

    mod policy {
        use std::collections::HashMap;
        use std::str::FromStr;
        use warden_core::ActionKind;
        use warden_safety::{PolicyRuleSet, Tier};

        #[test]
        fn test_tier_ordering_by_strictness() {
            assert!(Tier::Auto < Tier::NotifyOnly);
            assert!(Tier::NotifyOnly < Tier::RequireApproval);
        }

        #[test]
        fn test_tier_parse_and_display() {
            for tier in [Tier::Auto, Tier::NotifyOnly, Tier::RequireApproval] {
                assert_eq!(Tier::from_str(&tier.to_string()).unwrap(), tier);
            }
            assert!(Tier::from_str("mild").is_err());
        }

        #[test]
        fn test_unmapped_kind_fails_closed() {
            let rules = PolicyRuleSet::from_table(HashMap::new());
            for kind in ActionKind::ALL {
                assert_eq!(rules.classify(kind), Tier::RequireApproval);
            }
        }

        #[test]
        fn test_from_config_default_mapping() {
            let config = warden_config::WardenConfig::default();
            let rules = PolicyRuleSet::from_config(&config).unwrap();
            assert_eq!(rules.classify(ActionKind::ReadFile), Tier::Auto);
            assert_eq!(rules.classify(ActionKind::WriteFile), Tier::NotifyOnly);
            assert_eq!(rules.classify(ActionKind::DeleteFile), Tier::RequireApproval);
            assert_eq!(rules.classify(ActionKind::RunCommand), Tier::RequireApproval);
        }

        #[test]
        fn test_from_config_rejects_bad_tier() {
            let mut config = warden_config::WardenConfig::default();
            config.policy.insert("read_file".into(), "maybe".into());
            assert!(PolicyRuleSet::from_config(&config).is_err());
        }

        #[test]
        fn test_entries_sorted_and_total() {
            let config = warden_config::WardenConfig::default();
            let rules = PolicyRuleSet::from_config(&config).unwrap();
            let entries = rules.entries();
            assert_eq!(entries.len(), ActionKind::ALL.len());
            let kinds: Vec<_> = entries.iter().map(|(k, _)| k.as_str()).collect();
            let mut sorted = kinds.clone();
            sorted.sort();
            assert_eq!(kinds, sorted);
        }
    }

    // ── Guardrails ─────────────────────────────────────────────

    mod guardrails {
        use warden_core::{ActionKind, ActionRequest};
        use warden_safety::{GuardrailEngine, GuardrailVerdict};

        fn shell(command: &str) -> ActionRequest {
            ActionRequest::new(
                ActionKind::RunCommand,
                serde_json::json!({"command": command}),
                "tester",
                "test",
            )
        }

        #[test]
        fn test_blocked_keyword_denies() {
            let engine = GuardrailEngine::new(vec!["rm -rf /".into()]);
            match engine.evaluate(&shell("sudo rm -rf / --no-preserve-root")) {
                GuardrailVerdict::Deny(detail) => assert!(detail.contains("rm -rf /")),
                GuardrailVerdict::Approve => panic!("dangerous command approved"),
            }
        }

        #[test]
        fn test_match_is_case_insensitive() {
            let engine = GuardrailEngine::new(vec!["MkFs".into()]);
            assert!(matches!(
                engine.evaluate(&shell("mkfs.ext4 /dev/sda1")),
                GuardrailVerdict::Deny(_)
            ));
        }

        #[test]
        fn test_clean_command_approved() {
            let engine = GuardrailEngine::new(vec!["rm -rf /".into(), "mkfs".into()]);
            assert!(matches!(
                engine.evaluate(&shell("ls -la /tmp")),
                GuardrailVerdict::Approve
            ));
        }

        #[test]
        fn test_every_string_parameter_is_checked() {
            let engine = GuardrailEngine::new(vec!["/etc/shadow".into()]);
            let request = ActionRequest::new(
                ActionKind::WriteFile,
                serde_json::json!({"path": "/etc/shadow", "content": "x"}),
                "tester",
                "test",
            );
            assert!(matches!(engine.evaluate(&request), GuardrailVerdict::Deny(_)));
        }

        #[test]
        fn test_empty_denylist_approves_everything() {
            let engine = GuardrailEngine::default();
            assert!(matches!(
                engine.evaluate(&shell("rm -rf /")),
                GuardrailVerdict::Approve
            ));
        }

        #[test]
        fn test_from_config_default_keywords() {
            let engine = GuardrailEngine::from_config(&warden_config::WardenConfig::default());
            assert!(matches!(
                engine.evaluate(&shell("rm -rf / ")),
                GuardrailVerdict::Deny(_)
            ));
        }
    }

    // ── Budget ledger ──────────────────────────────────────────

    mod ledger {
        use crate::{ledger_at, ManualClock};
        use std::sync::Arc;
        use warden_core::{ActionKind, Event, EventBus};
        use warden_safety::{BudgetLedger, ReserveOutcome};

        fn reserve(ledger: &BudgetLedger, amount: f64) -> ReserveOutcome {
            ledger.reserve(amount, "tester", ActionKind::InvokeModel)
        }

        #[test]
        fn test_reserve_admits_and_records() {
            let ledger = BudgetLedger::new(1.0, 0, 0.2, EventBus::default());
            let outcome = reserve(&ledger, 0.25);
            assert!(matches!(outcome, ReserveOutcome::Admitted { .. }));
            assert!((ledger.current_spend() - 0.25).abs() < 1e-9);
            assert!((ledger.remaining() - 0.75).abs() < 1e-9);
        }

        #[test]
        fn test_reserve_rejects_over_cap() {
            let ledger = BudgetLedger::new(1.0, 0, 0.2, EventBus::default());
            assert!(matches!(reserve(&ledger, 0.95), ReserveOutcome::Admitted { .. }));
            match reserve(&ledger, 0.10) {
                ReserveOutcome::Rejected {
                    needed_usd,
                    remaining_usd,
                } => {
                    assert!((needed_usd - 0.10).abs() < 1e-9);
                    assert!((remaining_usd - 0.05).abs() < 1e-9);
                }
                other => panic!("expected rejection, got {other:?}"),
            }
            // The rejected attempt must not have consumed anything.
            assert!((ledger.current_spend() - 0.95).abs() < 1e-9);
        }

        #[test]
        fn test_exact_fit_admitted_despite_float_drift() {
            let ledger = BudgetLedger::new(1.0, 0, 0.2, EventBus::default());
            for _ in 0..10 {
                assert!(matches!(reserve(&ledger, 0.1), ReserveOutcome::Admitted { .. }));
            }
            assert!(ledger.remaining() < 1e-9);
            assert!(matches!(reserve(&ledger, 0.1), ReserveOutcome::Rejected { .. }));
        }

        #[test]
        fn test_concurrent_reserves_never_exceed_cap() {
            let ledger = Arc::new(BudgetLedger::new(1.0, 0, 0.2, EventBus::default()));
            let handles: Vec<_> = (0..20)
                .map(|_| {
                    let ledger = Arc::clone(&ledger);
                    std::thread::spawn(move || {
                        matches!(
                            ledger.reserve(0.15, "tester", ActionKind::InvokeModel),
                            ReserveOutcome::Admitted { .. }
                        )
                    })
                })
                .collect();
            let admitted = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|&ok| ok)
                .count();
            // 6 × 0.15 = 0.90 fits; a seventh would overshoot the cap.
            assert_eq!(admitted, 6);
            assert!(ledger.current_spend() <= ledger.cap() + 1e-9);
            assert!((ledger.current_spend() - 0.90).abs() < 1e-9);
        }

        #[test]
        fn test_nan_cost_rejected_and_cap_stays_enforced() {
            let ledger = BudgetLedger::new(1.0, 0, 0.2, EventBus::default());
            match reserve(&ledger, f64::NAN) {
                ReserveOutcome::Rejected { needed_usd, .. } => assert!(needed_usd.is_nan()),
                other => panic!("expected rejection, got {other:?}"),
            }
            assert!(ledger.current_spend() < 1e-9);
            // The cap still works after the malformed attempt.
            assert!(matches!(reserve(&ledger, 0.5), ReserveOutcome::Admitted { .. }));
            assert!(matches!(reserve(&ledger, 0.6), ReserveOutcome::Rejected { .. }));
            assert!((ledger.current_spend() - 0.5).abs() < 1e-9);
        }

        #[test]
        fn test_negative_and_infinite_costs_rejected() {
            let ledger = BudgetLedger::new(1.0, 0, 0.2, EventBus::default());
            assert!(matches!(reserve(&ledger, -0.5), ReserveOutcome::Rejected { .. }));
            assert!(matches!(
                reserve(&ledger, f64::INFINITY),
                ReserveOutcome::Rejected { .. }
            ));
            assert!(ledger.current_spend() < 1e-9);
            assert!((ledger.remaining() - 1.0).abs() < 1e-9);
        }

        #[test]
        fn test_zero_cost_is_still_admitted() {
            let ledger = BudgetLedger::new(1.0, 0, 0.2, EventBus::default());
            assert!(matches!(reserve(&ledger, 0.0), ReserveOutcome::Admitted { .. }));
        }

        #[test]
        fn test_release_refunds_reservation() {
            let ledger = BudgetLedger::new(1.0, 0, 0.2, EventBus::default());
            let ReserveOutcome::Admitted { reservation, .. } = reserve(&ledger, 0.40) else {
                panic!("expected admission");
            };
            ledger.release(reservation);
            assert!(ledger.current_spend() < 1e-9);
            // Refund lands as a negative transaction, not a rewrite.
            let period = ledger.snapshot();
            assert_eq!(period.transactions.len(), 2);
            assert!((period.transactions[1].amount_usd + 0.40).abs() < 1e-9);
        }

        #[test]
        fn test_day_rollover_resets_spend() {
            let clock = ManualClock::at("2026-03-01T23:50:00Z");
            let ledger = ledger_at(1.0, 0, Arc::clone(&clock));
            assert!(matches!(reserve(&ledger, 0.40), ReserveOutcome::Admitted { .. }));

            clock.set("2026-03-02T00:10:00Z");
            assert!(ledger.current_spend() < 1e-9);
            assert_eq!(ledger.snapshot().day_key.to_string(), "2026-03-02");

            let closed = ledger.closed_periods();
            assert_eq!(closed.len(), 1);
            assert_eq!(closed[0].day_key.to_string(), "2026-03-01");
            assert!((closed[0].spent_usd - 0.40).abs() < 1e-9);
        }

        #[test]
        fn test_refund_lands_in_its_own_day_across_midnight() {
            let clock = ManualClock::at("2026-03-01T23:59:00Z");
            let ledger = ledger_at(1.0, 0, Arc::clone(&clock));
            let ReserveOutcome::Admitted { reservation, .. } = reserve(&ledger, 0.30) else {
                panic!("expected admission");
            };

            clock.set("2026-03-02T00:01:00Z");
            ledger.release(reservation);

            // Today's budget is untouched; yesterday's period shows the refund.
            assert!(ledger.current_spend() < 1e-9);
            let closed = ledger.closed_periods();
            assert_eq!(closed.len(), 1);
            assert!(closed[0].spent_usd < 1e-9);
            assert_eq!(closed[0].transactions.len(), 2);
        }

        #[test]
        fn test_utc_offset_shifts_the_day_boundary() {
            // 20:00 UTC at +5 is already the next local day.
            let clock = ManualClock::at("2026-03-01T20:00:00Z");
            let ledger = ledger_at(1.0, 5, clock);
            assert_eq!(ledger.snapshot().day_key.to_string(), "2026-03-02");
        }

        #[tokio::test]
        async fn test_low_water_warning_fires_once_per_period() {
            let events = EventBus::new(16);
            let mut rx = events.subscribe();
            let ledger = BudgetLedger::new(1.0, 0, 0.2, events);

            match reserve(&ledger, 0.5) {
                ReserveOutcome::Admitted {
                    crossed_low_water, ..
                } => assert!(!crossed_low_water),
                other => panic!("expected admission, got {other:?}"),
            }
            match reserve(&ledger, 0.4) {
                ReserveOutcome::Admitted {
                    crossed_low_water,
                    remaining_fraction,
                    ..
                } => {
                    assert!(crossed_low_water);
                    assert!(remaining_fraction <= 0.2);
                }
                other => panic!("expected admission, got {other:?}"),
            }
            // Further admissions below the mark stay quiet.
            match reserve(&ledger, 0.05) {
                ReserveOutcome::Admitted {
                    crossed_low_water, ..
                } => assert!(!crossed_low_water),
                other => panic!("expected admission, got {other:?}"),
            }

            let warnings = std::iter::from_fn(|| rx.try_recv().ok())
                .filter(|e| matches!(e, Event::BudgetWarning { .. }))
                .count();
            assert_eq!(warnings, 1);
        }
    }

    // ── Persistent transaction log ─────────────────────────────

    mod persistence {
        use warden_core::{ActionKind, EventBus};
        use warden_safety::{BudgetLedger, LedgerStore, ReserveOutcome};

        fn open_ledger(path: &std::path::Path) -> BudgetLedger {
            BudgetLedger::new(1.0, 0, 0.2, EventBus::default())
                .with_store(LedgerStore::open(path).unwrap())
                .unwrap()
        }

        #[test]
        fn test_spend_survives_restart() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("ledger.db");

            let ledger = open_ledger(&path);
            ledger.reserve(0.25, "tester", ActionKind::InvokeModel);
            ledger.reserve(0.30, "tester", ActionKind::InvokeModel);
            drop(ledger);

            let reopened = open_ledger(&path);
            assert!((reopened.current_spend() - 0.55).abs() < 1e-9);
        }

        #[test]
        fn test_refund_survives_restart() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("ledger.db");

            let ledger = open_ledger(&path);
            ledger.reserve(0.20, "tester", ActionKind::InvokeModel);
            let ReserveOutcome::Admitted { reservation, .. } =
                ledger.reserve(0.50, "tester", ActionKind::InvokeModel)
            else {
                panic!("expected admission");
            };
            ledger.release(reservation);
            drop(ledger);

            let reopened = open_ledger(&path);
            assert!((reopened.current_spend() - 0.20).abs() < 1e-9);
        }

        #[test]
        fn test_fresh_store_starts_empty() {
            let dir = tempfile::tempdir().unwrap();
            let ledger = open_ledger(&dir.path().join("ledger.db"));
            assert!(ledger.current_spend() < 1e-9);
        }
    }

    // ── Approval broker ────────────────────────────────────────

    mod approvals {
        use std::time::Duration;
        use tokio_util::sync::CancellationToken;
        use warden_core::{ActionKind, ActionRequest, Event, EventBus};
        use warden_safety::{ApprovalBroker, TicketStatus};

        fn request() -> ActionRequest {
            ActionRequest::new(
                ActionKind::DeleteFile,
                serde_json::json!({"path": "/tmp/x"}),
                "agent-1",
                "cleanup",
            )
        }

        #[tokio::test]
        async fn test_approve_lifecycle() {
            let broker = ApprovalBroker::new(EventBus::default());
            let id = broker.create(request(), Duration::from_secs(30));
            assert_eq!(broker.status(id), Some(TicketStatus::Pending));

            assert!(broker.approve(id, "alice"));
            assert_eq!(broker.status(id), Some(TicketStatus::Approved));

            // Every later transition is a no-op.
            assert!(!broker.approve(id, "bob"));
            assert!(!broker.deny(id, "bob"));
            assert_eq!(broker.status(id), Some(TicketStatus::Approved));

            let ticket = broker.get(id).unwrap();
            assert_eq!(ticket.resolver_id.as_deref(), Some("alice"));
            assert!(ticket.resolved_at.is_some());
        }

        #[tokio::test]
        async fn test_await_sees_later_approval() {
            let broker = ApprovalBroker::new(EventBus::default());
            let id = broker.create(request(), Duration::from_secs(30));

            let resolver = std::sync::Arc::clone(&broker);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                resolver.approve(id, "alice");
            });

            let status = broker.await_resolution(id, CancellationToken::new()).await;
            assert_eq!(status, TicketStatus::Approved);
        }

        #[tokio::test]
        async fn test_await_returns_immediately_when_already_resolved() {
            let broker = ApprovalBroker::new(EventBus::default());
            let id = broker.create(request(), Duration::from_secs(30));
            broker.deny(id, "alice");

            let status = broker.await_resolution(id, CancellationToken::new()).await;
            assert_eq!(status, TicketStatus::Denied);
        }

        #[tokio::test]
        async fn test_unattended_ticket_times_out() {
            let broker = ApprovalBroker::new(EventBus::default());
            let id = broker.create(request(), Duration::from_millis(50));

            let status = broker.await_resolution(id, CancellationToken::new()).await;
            assert_eq!(status, TicketStatus::TimedOut);
            assert_eq!(broker.status(id), Some(TicketStatus::TimedOut));
        }

        #[tokio::test]
        async fn test_cancellation_token_cancels_ticket() {
            let broker = ApprovalBroker::new(EventBus::default());
            let id = broker.create(request(), Duration::from_secs(30));

            let token = CancellationToken::new();
            let canceller = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                canceller.cancel();
            });

            let status = broker.await_resolution(id, token).await;
            assert_eq!(status, TicketStatus::Cancelled);
            assert_eq!(broker.status(id), Some(TicketStatus::Cancelled));
        }

        #[tokio::test]
        async fn test_single_winner_when_timeout_races_approval() {
            let broker = ApprovalBroker::new(EventBus::default());
            for _ in 0..25 {
                let id = broker.create(request(), Duration::from_millis(5));
                tokio::time::sleep(Duration::from_millis(5)).await;
                let approved = broker.approve(id, "race");
                let status = broker.status(id).unwrap();
                if approved {
                    assert_eq!(status, TicketStatus::Approved);
                } else {
                    assert_eq!(status, TicketStatus::TimedOut);
                }
                // Whoever won, the ticket is now immutable.
                assert!(!broker.deny(id, "late"));
                assert_eq!(broker.status(id), Some(status));
            }
        }

        #[tokio::test]
        async fn test_unknown_ticket_is_rejected() {
            let broker = ApprovalBroker::new(EventBus::default());
            assert!(!broker.approve(uuid::Uuid::new_v4(), "alice"));
            assert_eq!(broker.status(uuid::Uuid::new_v4()), None);
        }

        #[tokio::test]
        async fn test_pending_lists_only_unresolved() {
            let broker = ApprovalBroker::new(EventBus::default());
            let a = broker.create(request(), Duration::from_secs(30));
            let b = broker.create(request(), Duration::from_secs(30));
            broker.approve(a, "alice");

            let pending = broker.pending();
            assert_eq!(pending.len(), 1);
            assert_eq!(pending[0].id, b);
        }

        #[tokio::test]
        async fn test_ticket_resolvable_by_the_time_its_event_is_visible() {
            let events = EventBus::new(16);
            let mut rx = events.subscribe();
            let broker = ApprovalBroker::new(events);

            let id = broker.create(request(), Duration::from_secs(30));
            let event = rx.recv().await.unwrap();
            let Event::ApprovalRequested { ticket_id, .. } = event else {
                panic!("expected approval request event, got {event:?}");
            };
            assert_eq!(ticket_id, id);
            // A subscriber reacting to the event must find the ticket in
            // the table, never get a silent no-op.
            assert!(broker.approve(ticket_id, "subscriber"));
            assert_eq!(broker.status(id), Some(TicketStatus::Approved));
        }

        #[tokio::test]
        async fn test_lifecycle_events_published() {
            let events = EventBus::new(16);
            let mut rx = events.subscribe();
            let broker = ApprovalBroker::new(events);

            let id = broker.create(request(), Duration::from_secs(30));
            broker.approve(id, "alice");

            let first = rx.recv().await.unwrap();
            assert!(matches!(first, Event::ApprovalRequested { ticket_id, .. } if ticket_id == id));
            let second = rx.recv().await.unwrap();
            match second {
                Event::ApprovalResolved {
                    ticket_id, status, ..
                } => {
                    assert_eq!(ticket_id, id);
                    assert_eq!(status, "approved");
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
    }
}
