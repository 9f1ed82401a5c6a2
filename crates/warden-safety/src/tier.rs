use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Risk classification of an action kind, ordered by strictness:
///
/// - **Auto**: execute immediately, no human in the loop.
/// - **NotifyOnly**: execute immediately, then tell the user after the fact.
/// - **RequireApproval**: suspend until a human approves, denies, or the
///   request times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Auto,
    NotifyOnly,
    RequireApproval,
}

impl Tier {
    pub fn requires_approval(&self) -> bool {
        matches!(self, Tier::RequireApproval)
    }

    pub fn notifies(&self) -> bool {
        matches!(self, Tier::NotifyOnly)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Auto => "auto",
            Tier::NotifyOnly => "notify",
            Tier::RequireApproval => "approve",
        };
        f.write_str(s)
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Tier::Auto),
            "notify" => Ok(Tier::NotifyOnly),
            "approve" => Ok(Tier::RequireApproval),
            other => Err(format!(
                "unknown tier '{other}' (expected auto, notify, or approve)"
            )),
        }
    }
}
