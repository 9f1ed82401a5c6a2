use thiserror::Error;

use crate::action::ActionKind;

/// Unified error type for the entire Warden gateway.
///
/// Only configuration errors are startup-fatal; every runtime condition is
/// surfaced to producers as a typed `Blocked` outcome, never an uncaught
/// fault.
#[derive(Error, Debug)]
pub enum WardenError {
    // ── Config errors (startup-fatal) ──────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Registry errors ────────────────────────────────────────
    #[error("capability already registered for kind '{0}'")]
    DuplicateCapability(ActionKind),

    // ── Handler errors ─────────────────────────────────────────
    #[error("handler failed: {kind}: {reason}")]
    Handler { kind: ActionKind, reason: String },

    // ── Ledger errors ──────────────────────────────────────────
    #[error("ledger error: {0}")]
    Ledger(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, WardenError>;
