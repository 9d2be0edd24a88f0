// Moderation verdict: the unified output of one check.
//
// `decision` says whether the content violated policy; `action` says what
// the caller should do about it. They differ when auto-block is off: the
// decision stays UNSAFE for downstream consumers while the action is ALLOW.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signals::traits::SignalOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Safe,
    Unsafe,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Safe => "safe",
            Decision::Unsafe => "unsafe",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    Block,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Block => "block",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregated view of one category within one modality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDetail {
    /// Max severity across succeeding sources.
    pub severity: f64,
    /// Threshold the severity was compared against. None for keyword
    /// hits, which violate unconditionally.
    pub threshold: Option<f64>,
    pub violated: bool,
    /// Score each contributing source reported for this category.
    pub sources: BTreeMap<String, f64>,
}

/// Everything the merge concluded about one modality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalityCheck {
    pub violated: bool,
    /// Deduplicated restricted terms, first-seen order.
    pub restricted_terms: Vec<String>,
    pub categories: BTreeMap<String, CategoryDetail>,
    /// Raw outcomes of every source dispatched for this modality,
    /// abstentions included.
    pub signals: Vec<SignalOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationVerdict {
    pub decision: Decision,
    pub action: Action,
    pub reasons: Vec<String>,
    pub text_check: Option<ModalityCheck>,
    pub image_check: Option<ModalityCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ModerationVerdict {
    pub fn is_unsafe(&self) -> bool {
        self.decision == Decision::Unsafe
    }

    pub fn is_blocked(&self) -> bool {
        self.action == Action::Block
    }

    /// Short human-readable outcome for UIs.
    pub fn message(&self) -> &'static str {
        match (self.decision, self.action) {
            (Decision::Safe, _) => "Content approved",
            (Decision::Unsafe, Action::Allow) => "Content flagged for review",
            (Decision::Unsafe, Action::Block) => "Content blocked due to policy violation",
        }
    }

    /// Per-category detail across both modalities, keyed `<modality>.<category>`.
    pub fn per_category_detail(&self) -> BTreeMap<String, &CategoryDetail> {
        let mut detail = BTreeMap::new();
        for (prefix, check) in [("text", &self.text_check), ("image", &self.image_check)] {
            if let Some(check) = check {
                for (category, d) in &check.categories {
                    detail.insert(format!("{prefix}.{category}"), d);
                }
            }
        }
        detail
    }
}
