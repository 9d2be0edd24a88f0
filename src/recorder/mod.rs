// Violation recorder: append UNSAFE verdicts to the audit log and keep
// running statistics over everything recorded.
//
// The recorder never fails its caller. A write error is logged and the
// record is not counted, so statistics only ever reflect what actually
// reached the log. Appends are serialized through one async mutex, which
// keeps concurrent checks from interleaving lines or losing counts.

pub mod jsonl;
pub mod memory;
pub mod models;
pub mod traits;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::fusion::verdict::ModerationVerdict;
use models::{ViolationRecord, ViolationStats};
use traits::ViolationLog;

pub const DEFAULT_RECENT_WINDOW_HOURS: i64 = 24;

/// Largest accepted recency window (about a century).
pub const MAX_RECENT_WINDOW_HOURS: i64 = 876_000;

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    recorded_at: DateTime<Utc>,
    text_violated: bool,
    image_violated: bool,
}

impl From<&ViolationRecord> for IndexEntry {
    fn from(record: &ViolationRecord) -> Self {
        Self {
            recorded_at: record.recorded_at,
            text_violated: record.text_violated(),
            image_violated: record.image_violated(),
        }
    }
}

pub struct ViolationRecorder {
    log: Arc<dyn ViolationLog>,
    index: Mutex<Vec<IndexEntry>>,
    recent_window: chrono::Duration,
}

impl ViolationRecorder {
    /// Open a recorder over `log`, replaying existing entries so that
    /// statistics include violations from earlier runs.
    pub async fn open(log: Arc<dyn ViolationLog>, recent_window_hours: i64) -> Self {
        let index = match log.load().await {
            Ok(records) => {
                info!(
                    log = %log.describe(),
                    records = records.len(),
                    "Loaded violation log"
                );
                records.iter().map(IndexEntry::from).collect()
            }
            Err(e) => {
                warn!(log = %log.describe(), error = %e, "Could not replay violation log, starting empty");
                Vec::new()
            }
        };

        Self {
            log,
            index: Mutex::new(index),
            recent_window: chrono::Duration::try_hours(recent_window_hours.max(0))
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    pub fn describe_log(&self) -> String {
        self.log.describe()
    }

    /// Append a record for `verdict`. Returns whether the write succeeded.
    pub async fn record(&self, verdict: &ModerationVerdict, excerpt: &str) -> bool {
        let record = ViolationRecord {
            recorded_at: Utc::now(),
            verdict: verdict.clone(),
            submission_excerpt: excerpt.to_string(),
        };

        let mut index = self.index.lock().await;
        match self.log.append(&record).await {
            Ok(()) => {
                index.push(IndexEntry::from(&record));
                true
            }
            Err(e) => {
                error!(
                    log = %self.log.describe(),
                    error = %e,
                    "Failed to record violation"
                );
                false
            }
        }
    }

    pub async fn get_statistics(&self) -> ViolationStats {
        self.statistics_as_of(Utc::now()).await
    }

    /// Statistics with the recency window measured back from `now`.
    pub async fn statistics_as_of(&self, now: DateTime<Utc>) -> ViolationStats {
        let index = self.index.lock().await;
        // A window reaching past the earliest representable time covers everything
        let cutoff = now.checked_sub_signed(self.recent_window);
        let recent = match cutoff {
            Some(cutoff) => index.iter().filter(|e| e.recorded_at >= cutoff).count(),
            None => index.len(),
        };

        ViolationStats {
            total_violations: index.len(),
            text_violations: index.iter().filter(|e| e.text_violated).count(),
            image_violations: index.iter().filter(|e| e.image_violated).count(),
            recent_violations: recent,
            recent_window_hours: self.recent_window.num_hours(),
        }
    }
}
