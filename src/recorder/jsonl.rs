// Line-delimited JSON violation log.
//
// Each append opens the file in append mode and writes one complete line,
// so a crash can at worst truncate the final line. Unparseable lines are
// skipped on load with a warning.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use super::models::ViolationRecord;
use super::traits::ViolationLog;

pub struct JsonlViolationLog {
    path: PathBuf,
}

impl JsonlViolationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse log contents, skipping blank and malformed lines.
pub fn parse_lines(contents: &str) -> Vec<ViolationRecord> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<ViolationRecord>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(line = n + 1, error = %e, "Skipping malformed violation log line");
                None
            }
        })
        .collect()
}

#[async_trait]
impl ViolationLog for JsonlViolationLog {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn append(&self, record: &ViolationRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create directory for {}", self.path.display())
                })?;
            }
        }

        let mut line = serde_json::to_string(record).context("Failed to serialize violation")?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open violation log {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to write violation log {}", self.path.display()))?;
        file.flush().await?;
        Ok(())
    }

    async fn load(&self) -> Result<Vec<ViolationRecord>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read violation log {}", self.path.display()))?;
        Ok(parse_lines(&contents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::verdict::{Action, Decision, ModerationVerdict};
    use chrono::Utc;

    fn record(excerpt: &str) -> ViolationRecord {
        ViolationRecord {
            recorded_at: Utc::now(),
            verdict: ModerationVerdict {
                decision: Decision::Unsafe,
                action: Action::Block,
                reasons: vec!["Text contains restricted words: hate".to_string()],
                text_check: None,
                image_check: None,
                user_id: Some("user123".to_string()),
                timestamp: Utc::now(),
            },
            submission_excerpt: excerpt.to_string(),
        }
    }

    #[tokio::test]
    async fn test_append_then_load_preserves_order() {
        let path = std::env::temp_dir().join(format!("sieve-jsonl-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let log = JsonlViolationLog::new(&path);

        log.append(&record("first")).await.unwrap();
        log.append(&record("second")).await.unwrap();

        let loaded = log.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].submission_excerpt, "first");
        assert_eq!(loaded[1].verdict.user_id.as_deref(), Some("user123"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        let first: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        for key in ["timestamp", "decision", "reasons", "text_check", "image_check"] {
            assert!(first.get(key).is_some(), "missing key {key}");
        }

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let log = JsonlViolationLog::new(std::env::temp_dir().join("sieve-no-such-log.jsonl"));
        assert!(log.load().await.unwrap().is_empty());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let good = serde_json::to_string(&record("ok")).unwrap();
        let contents = format!("{good}\nnot json\n\n{good}\n");
        assert_eq!(parse_lines(&contents).len(), 2);
    }
}
