use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use warden_core::{ActionKind, Event, EventBus};

use crate::store::LedgerStore;

/// Clock seam so rollover behavior is testable across midnight.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall clock. The default for production ledgers.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One committed charge (or negative-amount refund) against a day's budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub timestamp: DateTime<Utc>,
    pub requester_id: String,
    pub kind: ActionKind,
    pub amount_usd: f64,
}

/// One calendar day of accounting. The current period is live; closed
/// periods are retained read-only for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetPeriod {
    pub day_key: NaiveDate,
    pub cap_usd: f64,
    pub spent_usd: f64,
    pub transactions: Vec<Transaction>,
}

impl BudgetPeriod {
    fn fresh(day_key: NaiveDate, cap_usd: f64) -> Self {
        Self {
            day_key,
            cap_usd,
            spent_usd: 0.0,
            transactions: Vec::new(),
        }
    }
}

/// Proof of an admitted charge. Held by the gateway while an approval is
/// pending and surrendered back via [`BudgetLedger::release`] on any
/// non-executed outcome.
#[derive(Debug)]
pub struct Reservation {
    pub id: Uuid,
    pub amount_usd: f64,
    pub requester_id: String,
    pub kind: ActionKind,
    pub day_key: NaiveDate,
}

/// Outcome of a reserve attempt. `Rejected` is a normal result, not an
/// error — the gateway interprets it as "try the no-cost fallback lane".
#[derive(Debug)]
pub enum ReserveOutcome {
    Admitted {
        reservation: Reservation,
        remaining_fraction: f64,
        crossed_low_water: bool,
    },
    Rejected {
        needed_usd: f64,
        remaining_usd: f64,
    },
}

struct LedgerState {
    current: BudgetPeriod,
    closed: Vec<BudgetPeriod>,
    low_water_warned: bool,
}

/// Tracks model spend against a rolling daily cap.
///
/// The check-and-record step is atomic under one lock, so concurrent
/// reservations can never jointly exceed the cap. Day rollover happens
/// lazily on any operation, keyed by the wall-clock date in a configured
/// fixed UTC offset.
pub struct BudgetLedger {
    state: Mutex<LedgerState>,
    cap_usd: f64,
    offset_secs: i64,
    low_water_fraction: f64,
    clock: Arc<dyn Clock>,
    store: Option<LedgerStore>,
    events: EventBus,
}

// Float sums drift; an exact-fit charge must not be spuriously rejected.
const ADMIT_EPSILON: f64 = 1e-9;

impl BudgetLedger {
    pub fn new(cap_usd: f64, utc_offset_hours: i8, low_water_fraction: f64, events: EventBus) -> Self {
        Self::with_clock(
            cap_usd,
            utc_offset_hours,
            low_water_fraction,
            events,
            Arc::new(SystemClock),
        )
    }

    pub fn with_clock(
        cap_usd: f64,
        utc_offset_hours: i8,
        low_water_fraction: f64,
        events: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let offset_secs = i64::from(utc_offset_hours) * 3600;
        let day_key = Self::day_key_at(clock.now_utc(), offset_secs);
        Self {
            state: Mutex::new(LedgerState {
                current: BudgetPeriod::fresh(day_key, cap_usd),
                closed: Vec::new(),
                low_water_warned: false,
            }),
            cap_usd,
            offset_secs,
            low_water_fraction,
            clock,
            store: None,
            events,
        }
    }

    /// Attach a persistent transaction log and reconstruct today's spend
    /// from it. Call before the ledger sees traffic.
    pub fn with_store(mut self, store: LedgerStore) -> warden_core::Result<Self> {
        let day_key = Self::day_key_at(self.clock.now_utc(), self.offset_secs);
        let transactions = store.load_day(day_key)?;
        let spent: f64 = transactions.iter().map(|t| t.amount_usd).sum();
        if !transactions.is_empty() {
            info!(
                %day_key,
                spent_usd = spent,
                count = transactions.len(),
                "reloaded budget ledger from transaction log"
            );
        }
        {
            let mut state = self.state.lock();
            state.current = BudgetPeriod {
                day_key,
                cap_usd: self.cap_usd,
                spent_usd: spent.max(0.0),
                transactions,
            };
        }
        self.store = Some(store);
        Ok(self)
    }

    /// Atomically check `spent + amount <= cap` for the current period and,
    /// if admitted, record the transaction in the same step.
    pub fn reserve(&self, amount_usd: f64, requester_id: &str, kind: ActionKind) -> ReserveOutcome {
        let now = self.clock.now_utc();
        let mut rolled_to = None;
        let outcome = {
            let mut state = self.state.lock();
            self.maybe_roll_over(&mut state, now, &mut rolled_to);

            // NaN defeats every comparison below and a negative amount
            // would grow the budget; neither may ever touch `spent_usd`.
            if !amount_usd.is_finite() || amount_usd < 0.0 {
                warn!(
                    needed_usd = amount_usd,
                    "rejecting malformed charge amount"
                );
                ReserveOutcome::Rejected {
                    needed_usd: amount_usd,
                    remaining_usd: (self.cap_usd - state.current.spent_usd).max(0.0),
                }
            } else if state.current.spent_usd + amount_usd > self.cap_usd + ADMIT_EPSILON {
                let remaining = (self.cap_usd - state.current.spent_usd).max(0.0);
                warn!(
                    needed_usd = amount_usd,
                    remaining_usd = remaining,
                    "budget reservation rejected"
                );
                ReserveOutcome::Rejected {
                    needed_usd: amount_usd,
                    remaining_usd: remaining,
                }
            } else {
                let tx = Transaction {
                    timestamp: now,
                    requester_id: requester_id.to_string(),
                    kind,
                    amount_usd,
                };
                state.current.spent_usd += amount_usd;
                state.current.transactions.push(tx.clone());
                let day_key = state.current.day_key;
                self.append_to_store(&tx, day_key);

                let remaining_fraction =
                    ((self.cap_usd - state.current.spent_usd) / self.cap_usd).max(0.0);
                let crossed_low_water =
                    !state.low_water_warned && remaining_fraction <= self.low_water_fraction;
                if crossed_low_water {
                    state.low_water_warned = true;
                }
                ReserveOutcome::Admitted {
                    reservation: Reservation {
                        id: Uuid::new_v4(),
                        amount_usd,
                        requester_id: requester_id.to_string(),
                        kind,
                        day_key,
                    },
                    remaining_fraction,
                    crossed_low_water,
                }
            }
        };

        if let Some(day_key) = rolled_to {
            self.events.publish(Event::BudgetDayRolledOver { day_key });
        }
        if let ReserveOutcome::Admitted {
            crossed_low_water: true,
            remaining_fraction,
            ..
        } = outcome
        {
            self.events.publish(Event::BudgetWarning { remaining_fraction });
        }
        outcome
    }

    /// Compensating refund: the reserved spend never actually happened.
    /// Appends a negative-amount transaction so the persisted log stays
    /// append-only, and decrements the period that was charged.
    pub fn release(&self, reservation: Reservation) {
        let now = self.clock.now_utc();
        let refund = Transaction {
            timestamp: now,
            requester_id: reservation.requester_id.clone(),
            kind: reservation.kind,
            amount_usd: -reservation.amount_usd,
        };

        let mut state = self.state.lock();
        let period = if state.current.day_key == reservation.day_key {
            Some(&mut state.current)
        } else {
            state
                .closed
                .iter_mut()
                .find(|p| p.day_key == reservation.day_key)
        };
        match period {
            Some(period) => {
                period.spent_usd = (period.spent_usd - reservation.amount_usd).max(0.0);
                period.transactions.push(refund.clone());
            }
            None => {
                warn!(
                    day_key = %reservation.day_key,
                    "refund for unknown budget period dropped"
                );
                return;
            }
        }
        drop(state);
        self.append_to_store(&refund, reservation.day_key);
        info!(
            amount_usd = reservation.amount_usd,
            kind = %reservation.kind,
            "released budget reservation"
        );
    }

    pub fn current_spend(&self) -> f64 {
        self.rolled_state(|s| s.current.spent_usd)
    }

    pub fn remaining(&self) -> f64 {
        self.rolled_state(|s| (self.cap_usd - s.current.spent_usd).max(0.0))
    }

    pub fn cap(&self) -> f64 {
        self.cap_usd
    }

    /// Snapshot of the current period.
    pub fn snapshot(&self) -> BudgetPeriod {
        self.rolled_state(|s| s.current.clone())
    }

    /// Closed periods, oldest first. Read-only audit history.
    pub fn closed_periods(&self) -> Vec<BudgetPeriod> {
        self.rolled_state(|s| s.closed.clone())
    }

    fn rolled_state<T>(&self, f: impl FnOnce(&LedgerState) -> T) -> T {
        let now = self.clock.now_utc();
        let mut rolled_to = None;
        let out = {
            let mut state = self.state.lock();
            self.maybe_roll_over(&mut state, now, &mut rolled_to);
            f(&state)
        };
        if let Some(day_key) = rolled_to {
            self.events.publish(Event::BudgetDayRolledOver { day_key });
        }
        out
    }

    fn maybe_roll_over(
        &self,
        state: &mut LedgerState,
        now: DateTime<Utc>,
        rolled_to: &mut Option<NaiveDate>,
    ) {
        let day_key = Self::day_key_at(now, self.offset_secs);
        if state.current.day_key != day_key {
            info!(from = %state.current.day_key, to = %day_key, "budget day rolled over");
            let closed = std::mem::replace(
                &mut state.current,
                BudgetPeriod::fresh(day_key, self.cap_usd),
            );
            state.closed.push(closed);
            state.low_water_warned = false;
            *rolled_to = Some(day_key);
        }
    }

    fn append_to_store(&self, tx: &Transaction, day_key: NaiveDate) {
        if let Some(store) = &self.store {
            if let Err(e) = store.append(tx, day_key) {
                warn!(error = %e, "failed to persist ledger transaction");
            }
        }
    }

    fn day_key_at(now: DateTime<Utc>, offset_secs: i64) -> NaiveDate {
        (now + Duration::seconds(offset_secs)).date_naive()
    }
}
