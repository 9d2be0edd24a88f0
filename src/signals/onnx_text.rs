// Local ONNX text classifier using Detoxify's unbiased-toxic-roberta model.
//
// Runs entirely on the local CPU. The model emits seven independent
// logits; each goes through a sigmoid and is reported as its own category.
//
// Model: protectai/unbiased-toxic-roberta-onnx (quantized, ~126MB)

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::debug;

use super::download::{TEXT_MODEL_FILE, TEXT_TOKENIZER_FILE};
use super::statistical::CategoryModel;
use super::traits::{Modality, SignalInput};

/// Labels output by unbiased-toxic-roberta, in the order the model returns them.
pub const TEXT_LABELS: [&str; 7] = [
    "toxicity",
    "severe_toxicity",
    "obscene",
    "identity_attack",
    "insult",
    "threat",
    "sexual_explicit",
];

/// Longest token sequence RoBERTa accepts.
const MAX_TOKENS: usize = 512;

pub struct OnnxTextModel {
    // ort::Session::run takes &mut self; inference runs on spawn_blocking
    session: Arc<Mutex<Session>>,
    tokenizer: Arc<Tokenizer>,
}

impl OnnxTextModel {
    /// Load the model and tokenizer from `model_dir`.
    ///
    /// Run `sieve download-model` first if the files are missing.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join(TEXT_MODEL_FILE);
        let tokenizer_path = model_dir.join(TEXT_TOKENIZER_FILE);

        if !model_path.exists() {
            anyhow::bail!(
                "Model file not found: {}\nRun `sieve download-model` to download it.",
                model_path.display()
            );
        }
        if !tokenizer_path.exists() {
            anyhow::bail!(
                "Tokenizer file not found: {}\nRun `sieve download-model` to download it.",
                tokenizer_path.display()
            );
        }

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;

        debug!("Loaded ONNX text model from {}", model_dir.display());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            tokenizer: Arc::new(tokenizer),
        })
    }
}

#[async_trait]
impl CategoryModel for OnnxTextModel {
    fn modality(&self) -> Modality {
        Modality::Text
    }

    async fn score(&self, input: SignalInput<'_>) -> Result<BTreeMap<String, f64>> {
        let SignalInput::Text(text) = input else {
            anyhow::bail!("text model received a non-text payload");
        };

        let session = Arc::clone(&self.session);
        let tokenizer = Arc::clone(&self.tokenizer);
        let text = text.to_string();

        tokio::task::spawn_blocking(move || {
            let encoding = tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

            let ids: Vec<i64> = encoding
                .get_ids()
                .iter()
                .take(MAX_TOKENS)
                .map(|&id| id as i64)
                .collect();
            let mask: Vec<i64> = encoding
                .get_attention_mask()
                .iter()
                .take(MAX_TOKENS)
                .map(|&m| m as i64)
                .collect();

            let shape = [1_i64, ids.len() as i64];
            let input_ids = Tensor::from_array((shape, ids))
                .context("Failed to create input_ids tensor")?;
            let attention_mask = Tensor::from_array((shape, mask))
                .context("Failed to create attention_mask tensor")?;

            let logits = {
                let mut session = session
                    .lock()
                    .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

                let outputs = session
                    .run(ort::inputs! {
                        "input_ids" => input_ids,
                        "attention_mask" => attention_mask
                    })
                    .context("ONNX inference failed")?;

                // Output shape: [1, 7] raw logits
                let (_shape, data) = outputs[0]
                    .try_extract_tensor::<f32>()
                    .context("Failed to extract output tensor")?;
                data.to_vec()
            };

            map_logits(&logits)
        })
        .await
        .context("spawn_blocking panicked")?
    }
}

/// Sigmoid activation: maps any real number to (0, 1).
fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Map one row of logits onto the label names.
fn map_logits(logits: &[f32]) -> Result<BTreeMap<String, f64>> {
    if logits.len() < TEXT_LABELS.len() {
        anyhow::bail!(
            "Expected {} logits from text model, got {}",
            TEXT_LABELS.len(),
            logits.len()
        );
    }
    Ok(TEXT_LABELS
        .iter()
        .zip(logits)
        .map(|(label, &logit)| (label.to_string(), sigmoid(logit as f64)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_zero() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_sigmoid_symmetry() {
        for x in [0.5, 1.0, 2.0, 5.0] {
            let sum = sigmoid(x) + sigmoid(-x);
            assert!((sum - 1.0).abs() < 1e-10, "sigmoid({x}) + sigmoid(-{x}) should equal 1.0");
        }
    }

    #[test]
    fn test_map_logits_names_every_label() {
        let scores = map_logits(&[0.0, 10.0, -10.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(scores.len(), 7);
        assert!((scores["toxicity"] - 0.5).abs() < 1e-6);
        assert!(scores["severe_toxicity"] > 0.999);
        assert!(scores["obscene"] < 0.001);
    }

    #[test]
    fn test_map_logits_rejects_short_row() {
        assert!(map_logits(&[0.1, 0.2]).is_err());
    }

    #[test]
    fn test_load_fails_without_files() {
        let dir = std::env::temp_dir().join("sieve-test-no-text-model");
        assert!(OnnxTextModel::load(&dir).is_err());
    }
}
