// Batch file parsing for the `batch` command.
//
// One JSON object per line: {"text": ..., "image_path": ..., "user_id": ...}.
// Every non-blank line yields its own entry. A malformed line or an image
// that cannot be read fails only that entry, so the rest of the batch is
// still checked.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::fusion::engine::Submission;

/// One line of a batch file.
#[derive(Debug, Deserialize)]
struct BatchItem {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    image_path: Option<PathBuf>,
    #[serde(default)]
    user_id: Option<String>,
}

/// Parse `contents` into per-line submissions. Blank lines are skipped.
pub async fn parse_entries(contents: &str) -> Vec<Result<Submission>> {
    let mut entries = Vec::new();
    for (n, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry = parse_line(line)
            .await
            .with_context(|| format!("Batch entry on line {}", n + 1));
        entries.push(entry);
    }
    entries
}

async fn parse_line(line: &str) -> Result<Submission> {
    let item: BatchItem = serde_json::from_str(line).context("Invalid JSON")?;
    let image = match &item.image_path {
        Some(path) => Some(
            tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read image {}", path.display()))?,
        ),
        None => None,
    };
    Ok(Submission {
        text: item.text,
        image,
        user_id: item.user_id,
    })
}
