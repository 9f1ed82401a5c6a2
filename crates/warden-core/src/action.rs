use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The closed set of effectful operations the gateway mediates.
///
/// Adding a kind is a source change: the policy table must name it and a
/// handler must be registered for it, both checked at startup. There is no
/// string-keyed fallthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ReadFile,
    WriteFile,
    DeleteFile,
    RunCommand,
    InstallPackage,
    InvokeModel,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::ReadFile,
        ActionKind::WriteFile,
        ActionKind::DeleteFile,
        ActionKind::RunCommand,
        ActionKind::InstallPackage,
        ActionKind::InvokeModel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ReadFile => "read_file",
            ActionKind::WriteFile => "write_file",
            ActionKind::DeleteFile => "delete_file",
            ActionKind::RunCommand => "run_command",
            ActionKind::InstallPackage => "install_package",
            ActionKind::InvokeModel => "invoke_model",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "read_file" => Ok(ActionKind::ReadFile),
            "write_file" => Ok(ActionKind::WriteFile),
            "delete_file" => Ok(ActionKind::DeleteFile),
            "run_command" => Ok(ActionKind::RunCommand),
            "install_package" => Ok(ActionKind::InstallPackage),
            "invoke_model" => Ok(ActionKind::InvokeModel),
            other => Err(format!("unknown action kind '{other}'")),
        }
    }
}

/// An action a producer wants the gateway to perform.
///
/// Immutable once submitted — the gateway never hands out a mutable
/// reference after the terminal outcome is recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: Uuid,
    pub kind: ActionKind,
    /// Handler-specific parameters (JSON object).
    pub params: Value,
    /// Estimated USD cost — present only for model-invoking kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd: Option<f64>,
    pub requester_id: String,
    /// Free text shown in audit entries and approval prompts.
    pub reason: String,
    pub submitted_at: DateTime<Utc>,
}

impl ActionRequest {
    pub fn new(kind: ActionKind, params: Value, requester_id: &str, reason: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            params,
            estimated_cost_usd: None,
            requester_id: requester_id.to_string(),
            reason: reason.to_string(),
            submitted_at: Utc::now(),
        }
    }

    pub fn with_cost(mut self, usd: f64) -> Self {
        self.estimated_cost_usd = Some(usd);
        self
    }
}

/// What a capability handler produced on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerOutput {
    pub content: String,
    /// Optional structured data returned alongside the text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl HandlerOutput {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Terminal outcome of a submitted action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionResult {
    Executed { output: HandlerOutput },
    Blocked { reason: BlockReason },
}

impl ActionResult {
    pub fn is_executed(&self) -> bool {
        matches!(self, ActionResult::Executed { .. })
    }
}

/// Why an action was blocked. Every variant carries enough context for a
/// human-readable message; a timeout is distinguishable from an explicit
/// denial so hosts can message them differently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    BudgetExceeded { needed_usd: f64, remaining_usd: f64 },
    ApprovalRefused { outcome: ApprovalOutcome },
    UnknownCapability { kind: ActionKind },
    GuardrailViolation { detail: String },
    HandlerFailure { detail: String },
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::BudgetExceeded {
                needed_usd,
                remaining_usd,
            } => write!(
                f,
                "daily budget exceeded: needed ${needed_usd:.4}, ${remaining_usd:.4} remaining"
            ),
            BlockReason::ApprovalRefused { outcome } => match outcome {
                ApprovalOutcome::Denied => write!(f, "approval denied by a human reviewer"),
                ApprovalOutcome::TimedOut => write!(f, "approval request timed out"),
                ApprovalOutcome::Cancelled => write!(f, "approval request was cancelled"),
                other => write!(f, "approval refused ({other:?})"),
            },
            BlockReason::UnknownCapability { kind } => {
                write!(f, "no capability registered for '{kind}'")
            }
            BlockReason::GuardrailViolation { detail } => {
                write!(f, "blocked by guardrail: {detail}")
            }
            BlockReason::HandlerFailure { detail } => write!(f, "handler failed: {detail}"),
        }
    }
}

/// Budget leg of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetOutcome {
    Charged,
    NotApplicable,
    Rejected,
}

/// Approval leg of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    NotRequired,
    Approved,
    Denied,
    TimedOut,
    Cancelled,
}
