use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

use warden_core::{ActionKind, WardenError};
use warden_config::WardenConfig;

use crate::tier::Tier;

/// Immutable mapping from action kind to risk tier, loaded and validated
/// once at startup.
///
/// Classification is total and fail-closed: a kind absent from the table
/// resolves to [`Tier::RequireApproval`], never to auto-execution.
#[derive(Debug, Clone)]
pub struct PolicyRuleSet {
    table: HashMap<ActionKind, Tier>,
}

impl PolicyRuleSet {
    /// Build the rule set from a loaded config. Malformed entries (unknown
    /// kinds, unknown tier names) abort here, not at request time.
    pub fn from_config(config: &WardenConfig) -> warden_core::Result<Self> {
        let mut table = HashMap::new();
        for (kind_name, tier_name) in &config.policy {
            let kind = ActionKind::from_str(kind_name).map_err(|e| {
                WardenError::ConfigValidation {
                    field: format!("policy.{kind_name}"),
                    reason: e,
                }
            })?;
            let tier = Tier::from_str(tier_name).map_err(|e| WardenError::ConfigValidation {
                field: format!("policy.{kind_name}"),
                reason: e,
            })?;
            // HashMap keys make literal duplicates unrepresentable, but an
            // alias slipping in through two spellings would be a bug here.
            if table.insert(kind, tier).is_some() {
                return Err(WardenError::ConfigValidation {
                    field: format!("policy.{kind_name}"),
                    reason: "duplicate tier mapping".into(),
                });
            }
        }
        Ok(Self { table })
    }

    /// Build directly from a tier table. Used by tests and embedders.
    pub fn from_table(table: HashMap<ActionKind, Tier>) -> Self {
        Self { table }
    }

    /// Classify an action kind. Never fails: unmapped kinds are
    /// fail-closed to `RequireApproval`.
    pub fn classify(&self, kind: ActionKind) -> Tier {
        let tier = self
            .table
            .get(&kind)
            .copied()
            .unwrap_or(Tier::RequireApproval);
        debug!(kind = %kind, tier = %tier, "classified action");
        tier
    }

    /// The loaded table, for display surfaces.
    pub fn entries(&self) -> Vec<(ActionKind, Tier)> {
        let mut entries: Vec<_> = self.table.iter().map(|(k, t)| (*k, *t)).collect();
        entries.sort_by_key(|(k, _)| k.as_str());
        entries
    }
}
