//! # warden-gateway
//!
//! The orchestrator that ties the safety subsystems together: every
//! `ActionRequest` flows through tier classification, the budget ledger,
//! the approval broker, and finally the capability registry, with exactly
//! one audit entry written at every terminal state.

pub mod audit;
pub mod gateway;
pub mod registry;

pub use audit::{AuditEntry, AuditLog, FinalOutcome};
pub use gateway::Gateway;
pub use registry::CapabilityRegistry;
