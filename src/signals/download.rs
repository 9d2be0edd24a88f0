// Model download helper for the ONNX text classifier.
//
// Downloads Detoxify unbiased-toxic-roberta (~126MB) from HuggingFace.
// The image classifier has no canonical public weights; drop an
// `image_model.onnx` (and optionally `image_labels.txt`) into the model
// directory by hand to enable it.
//
// Files are stored in a platform-appropriate directory
// (~/.local/share/sieve/models/ on Linux) so they persist across runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

/// HuggingFace repo for the text model.
const TEXT_HF_URL: &str = "https://huggingface.co/protectai/unbiased-toxic-roberta-onnx/resolve/main";

pub const TEXT_MODEL_FILE: &str = "model_quantized.onnx";
pub const TEXT_TOKENIZER_FILE: &str = "tokenizer.json";
pub const IMAGE_MODEL_FILE: &str = "image_model.onnx";
pub const IMAGE_LABELS_FILE: &str = "image_labels.txt";

/// Returns the default directory for storing model files.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sieve")
        .join("models")
}

/// Check whether both text model files exist.
pub fn text_model_present(dir: &Path) -> bool {
    dir.join(TEXT_MODEL_FILE).exists() && dir.join(TEXT_TOKENIZER_FILE).exists()
}

pub fn image_model_present(dir: &Path) -> bool {
    dir.join(IMAGE_MODEL_FILE).exists()
}

/// Download the text model. Skips files that already exist.
pub async fn download_text_model(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create model directory: {}", dir.display()))?;

    println!("\nText model (unbiased-toxic-roberta):");

    for (file, show_progress, label) in [
        (TEXT_TOKENIZER_FILE, false, ""),
        (TEXT_MODEL_FILE, true, " (~126 MB)"),
    ] {
        let dest = dir.join(file);
        if dest.exists() {
            info!(file, "Model file already exists, skipping");
            println!("  {} (already exists)", file);
            continue;
        }
        println!("  Downloading {}{}...", file, label);
        download_file(&format!("{}/{}", TEXT_HF_URL, file), &dest, show_progress).await?;
    }

    Ok(())
}

/// Download a single file from a URL to a local path.
async fn download_file(url: &str, dest: &Path, show_progress: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {}", url))?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    let pb = if show_progress {
        let pb = match response.content_length() {
            Some(size) => {
                let pb = ProgressBar::new(size);
                if let Ok(style) =
                    ProgressStyle::default_bar().template("    [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                {
                    pb.set_style(style.progress_chars("=> "));
                }
                pb
            }
            None => ProgressBar::new_spinner(),
        };
        Some(pb)
    } else {
        None
    };

    let bytes = response
        .bytes()
        .await
        .context("Failed to read response body")?;

    if let Some(ref pb) = pb {
        pb.set_position(bytes.len() as u64);
    }

    std::fs::write(dest, &bytes).with_context(|| format!("Failed to write {}", dest.display()))?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    info!("Downloaded {} to {}", url, dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_model_dir_is_under_sieve() {
        let path_str = default_model_dir().to_string_lossy().to_string();
        assert!(
            path_str.contains("sieve") && path_str.contains("models"),
            "Expected path containing sieve/models, got: {path_str}"
        );
    }

    #[test]
    fn test_models_absent_in_empty_dir() {
        let dir = std::env::temp_dir().join("sieve-test-nonexistent-models");
        assert!(!text_model_present(&dir));
        assert!(!image_model_present(&dir));
    }

    #[test]
    fn test_text_model_present_when_files_exist() {
        let dir = std::env::temp_dir().join("sieve-text-model-test");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(TEXT_MODEL_FILE), b"fake").unwrap();
        std::fs::write(dir.join(TEXT_TOKENIZER_FILE), b"fake").unwrap();

        assert!(text_model_present(&dir));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
