// Audit-log types.
//
// One ViolationRecord per UNSAFE verdict. The verdict is flattened into
// the record so each JSONL line carries timestamp, decision, reasons,
// text_check and image_check at the top level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fusion::verdict::ModerationVerdict;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    /// When the recorder appended the entry.
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub verdict: ModerationVerdict,
    /// Leading part of the submitted text (or an image marker).
    pub submission_excerpt: String,
}

impl ViolationRecord {
    pub fn text_violated(&self) -> bool {
        self.verdict.text_check.as_ref().is_some_and(|c| c.violated)
    }

    pub fn image_violated(&self) -> bool {
        self.verdict.image_check.as_ref().is_some_and(|c| c.violated)
    }
}

/// Running counters derived from the recorded violations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationStats {
    pub total_violations: usize,
    pub text_violations: usize,
    pub image_violations: usize,
    /// Violations recorded within the recency window before the query.
    pub recent_violations: usize,
    pub recent_window_hours: i64,
}
