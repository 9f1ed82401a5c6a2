use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use warden_core::ActionKind;

/// Root configuration — maps to `warden.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Action kind → tier name ("auto", "notify", "approve").
    /// Kinds absent from this table classify as requiring approval.
    pub policy: HashMap<String, String>,
    pub guardrails: GuardrailConfig,
    pub budget: BudgetConfig,
    pub approval: ApprovalConfig,
    pub model: ModelConfig,
    pub logging: LoggingConfig,
}

impl Default for WardenConfig {
    fn default() -> Self {
        let mut policy = HashMap::new();
        policy.insert("read_file".into(), "auto".into());
        policy.insert("write_file".into(), "notify".into());
        policy.insert("delete_file".into(), "approve".into());
        policy.insert("run_command".into(), "approve".into());
        policy.insert("install_package".into(), "approve".into());
        policy.insert("invoke_model".into(), "auto".into());
        Self {
            policy,
            guardrails: GuardrailConfig::default(),
            budget: BudgetConfig::default(),
            approval: ApprovalConfig::default(),
            model: ModelConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ── Guardrails ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    /// Case-insensitive substrings that deny a request outright when found
    /// in any of its string parameters, regardless of tier.
    pub blocked_keywords: Vec<String>,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            blocked_keywords: vec![
                "rm -rf /".into(),
                "mkfs".into(),
                "dd if=/dev/".into(),
                ":(){".into(),
            ],
        }
    }
}

// ── Budget ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Maximum USD spend per calendar day across all paid model calls.
    pub daily_cap_usd: f64,
    /// Fixed UTC offset (hours) defining where "midnight" falls for the
    /// daily rollover.
    pub utc_offset_hours: i8,
    /// Emit a budget warning when the remaining fraction of the cap drops
    /// to or below this value (0.0–1.0].
    pub low_water_fraction: f64,
    /// Where to persist the transaction log. None = in-memory only.
    pub ledger_path: Option<PathBuf>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_cap_usd: 1.0,
            utc_offset_hours: 0,
            low_water_fraction: 0.2,
            ledger_path: None,
        }
    }
}

// ── Approval ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Seconds before a pending ticket times out (auto-refusal).
    pub timeout_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

// ── Model capability ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// OpenAI-compatible endpoint for the paid model capability.
    pub base_url: String,
    pub model: String,
    /// Local (free) endpoint used as the budget fallback, e.g. Ollama.
    pub local_base_url: String,
    pub local_model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".into(),
            model: "gpt-4o-mini".into(),
            local_base_url: "http://127.0.0.1:11434".into(),
            local_model: "llama3.2".into(),
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl WardenConfig {
    /// Validate the configuration. Returns warnings for suspicious but
    /// workable settings; returns Err for anything that must abort startup.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        for (kind, tier) in &self.policy {
            if ActionKind::from_str(kind).is_err() {
                return Err(format!("policy: unknown action kind '{kind}'"));
            }
            if !matches!(tier.as_str(), "auto" | "notify" | "approve") {
                return Err(format!(
                    "policy.{kind}: unknown tier '{tier}' (expected auto, notify, or approve)"
                ));
            }
        }

        for kind in ActionKind::ALL {
            if !self.policy.contains_key(kind.as_str()) {
                warnings.push(format!(
                    "policy: '{kind}' is not mapped and will require approval (fail-closed)"
                ));
            }
        }

        if self.guardrails.blocked_keywords.iter().any(|k| k.is_empty()) {
            return Err("guardrails.blocked_keywords: empty keyword would match everything".into());
        }

        if self.budget.daily_cap_usd <= 0.0 || !self.budget.daily_cap_usd.is_finite() {
            return Err(format!(
                "budget.daily_cap_usd must be a positive number, got {}",
                self.budget.daily_cap_usd
            ));
        }
        if !(-14..=14).contains(&self.budget.utc_offset_hours) {
            return Err(format!(
                "budget.utc_offset_hours must be within ±14, got {}",
                self.budget.utc_offset_hours
            ));
        }
        if !(self.budget.low_water_fraction > 0.0 && self.budget.low_water_fraction <= 1.0) {
            return Err(format!(
                "budget.low_water_fraction must be in (0, 1], got {}",
                self.budget.low_water_fraction
            ));
        }

        if self.approval.timeout_secs == 0 {
            return Err("approval.timeout_secs must be nonzero".into());
        }
        if self.approval.timeout_secs > 3600 {
            warnings.push(format!(
                "approval.timeout_secs = {} is over an hour; pending submits will block that long",
                self.approval.timeout_secs
            ));
        }

        Ok(warnings)
    }
}
