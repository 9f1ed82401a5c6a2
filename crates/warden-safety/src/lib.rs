//! # warden-safety
//!
//! The risk- and cost-control subsystems of the Warden gateway: tiered
//! action classification, the blocked-keyword guardrail engine, the
//! rolling daily budget ledger with its persistent transaction log, and
//! the human-in-the-loop approval broker.

pub mod approval;
pub mod guardrail;
pub mod ledger;
pub mod policy;
pub mod store;
pub mod tier;

pub use approval::{ApprovalBroker, ApprovalTicket, TicketStatus};
pub use guardrail::{GuardrailEngine, GuardrailVerdict};
pub use ledger::{BudgetLedger, BudgetPeriod, Clock, Reservation, ReserveOutcome, SystemClock, Transaction};
pub use policy::PolicyRuleSet;
pub use store::LedgerStore;
pub use tier::Tier;
