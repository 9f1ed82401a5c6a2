//! # warden-core
//!
//! Core types, traits, and primitives for the Warden action-safety gateway.
//! This crate defines the shared vocabulary used by every other crate in the
//! workspace: the action model, the outcome taxonomy, the handler and
//! notifier seams, and the system-wide event bus.

pub mod action;
pub mod error;
pub mod event;
pub mod handler;

pub use action::{
    ActionKind, ActionRequest, ActionResult, ApprovalOutcome, BlockReason, BudgetOutcome,
    HandlerOutput,
};
pub use error::{Result, WardenError};
pub use event::{Event, EventBus};
pub use handler::{CapabilityHandler, Notifier, NullNotifier};
