use tracing::warn;

use warden_core::ActionRequest;
use warden_config::WardenConfig;

/// Verdict of a guardrail evaluation.
#[derive(Debug, Clone)]
pub enum GuardrailVerdict {
    /// Action may proceed to the budget and approval legs.
    Approve,
    /// Action is denied outright — carries the reason.
    Deny(String),
}

/// Content-level denylist applied before any tier handling.
///
/// A request whose string parameters contain a blocked keyword is denied
/// regardless of tier — approval cannot whitewash `rm -rf /`. Matching is
/// case-insensitive substring, over every top-level string parameter.
pub struct GuardrailEngine {
    blocked_keywords: Vec<String>,
}

impl GuardrailEngine {
    pub fn new(blocked_keywords: Vec<String>) -> Self {
        Self {
            blocked_keywords: blocked_keywords
                .into_iter()
                .map(|k| k.to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &WardenConfig) -> Self {
        Self::new(config.guardrails.blocked_keywords.clone())
    }

    pub fn evaluate(&self, request: &ActionRequest) -> GuardrailVerdict {
        let Some(params) = request.params.as_object() else {
            return GuardrailVerdict::Approve;
        };
        for (key, value) in params {
            let Some(text) = value.as_str() else { continue };
            let lowered = text.to_lowercase();
            for keyword in &self.blocked_keywords {
                if lowered.contains(keyword) {
                    warn!(
                        kind = %request.kind,
                        param = key,
                        keyword = keyword,
                        "guardrail denied action"
                    );
                    return GuardrailVerdict::Deny(format!(
                        "parameter '{key}' contains blocked keyword '{keyword}'"
                    ));
                }
            }
        }
        GuardrailVerdict::Approve
    }
}

impl Default for GuardrailEngine {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
