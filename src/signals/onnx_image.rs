// Local ONNX image classifier.
//
// Decodes the submitted bytes, resizes to 224x224, and feeds a normalized
// NCHW float tensor [1, 3, 224, 224] to a classification head. The "safe"
// class is a label like any other in the model's output but is never
// reported as a violation category.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use ort::session::Session;
use ort::value::Tensor;
use tracing::debug;

use super::download::{IMAGE_LABELS_FILE, IMAGE_MODEL_FILE};
use super::keyword::parse_term_list;
use super::statistical::CategoryModel;
use super::traits::{Modality, SignalInput};

/// Class labels used when the model directory carries no labels file.
pub const DEFAULT_IMAGE_LABELS: [&str; 5] =
    ["safe", "inappropriate", "violence", "nudity", "hate_symbols"];

/// The label that means "nothing to report".
const SAFE_LABEL: &str = "safe";

const INPUT_SIZE: u32 = 224;

pub struct OnnxImageModel {
    session: Arc<Mutex<Session>>,
    labels: Arc<Vec<String>>,
}

impl OnnxImageModel {
    /// Load `image_model.onnx` (and optional `image_labels.txt`) from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let model_path = model_dir.join(IMAGE_MODEL_FILE);
        if !model_path.exists() {
            anyhow::bail!("Image model file not found: {}", model_path.display());
        }

        let labels_path = model_dir.join(IMAGE_LABELS_FILE);
        let labels = if labels_path.exists() {
            let contents = std::fs::read_to_string(&labels_path)
                .with_context(|| format!("Failed to read {}", labels_path.display()))?;
            parse_term_list(&contents)
        } else {
            DEFAULT_IMAGE_LABELS.iter().map(|l| l.to_string()).collect()
        };

        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(&model_path)
            .with_context(|| format!("Failed to load ONNX model from {}", model_path.display()))?;

        debug!(labels = labels.len(), "Loaded ONNX image model from {}", model_dir.display());

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            labels: Arc::new(labels),
        })
    }
}

#[async_trait]
impl CategoryModel for OnnxImageModel {
    fn modality(&self) -> Modality {
        Modality::Image
    }

    async fn score(&self, input: SignalInput<'_>) -> Result<BTreeMap<String, f64>> {
        let SignalInput::Image(bytes) = input else {
            anyhow::bail!("image model received a non-image payload");
        };

        let session = Arc::clone(&self.session);
        let labels = Arc::clone(&self.labels);
        let bytes = bytes.to_vec();

        tokio::task::spawn_blocking(move || {
            let pixels = preprocess(&bytes)?;
            let shape = [1_i64, 3, INPUT_SIZE as i64, INPUT_SIZE as i64];
            let tensor =
                Tensor::from_array((shape, pixels)).context("Failed to create image tensor")?;

            let output = {
                let mut session = session
                    .lock()
                    .map_err(|e| anyhow::anyhow!("Session lock poisoned: {}", e))?;

                let outputs = session
                    .run(ort::inputs! { "input" => tensor })
                    .context("ONNX inference failed")?;

                let (_shape, data) = outputs[0]
                    .try_extract_tensor::<f32>()
                    .context("Failed to extract output tensor")?;
                data.to_vec()
            };

            Ok(map_outputs(&labels, &output))
        })
        .await
        .context("spawn_blocking panicked")?
    }
}

/// Decode and convert to a flat NCHW buffer with values in [0, 1].
fn preprocess(bytes: &[u8]) -> Result<Vec<f32>> {
    let img = image::load_from_memory(bytes).context("Failed to decode image")?;
    let rgb = img
        .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
        .to_rgb8();

    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
    let mut data = vec![0.0_f32; 3 * plane];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = (y * INPUT_SIZE + x) as usize;
        for channel in 0..3 {
            data[channel * plane + idx] = pixel[channel] as f32 / 255.0;
        }
    }
    Ok(data)
}

/// Turn raw model outputs into per-category probabilities.
///
/// Outputs already in [0, 1] are taken as probabilities; anything else is
/// treated as logits and softmaxed. The safe label is dropped.
fn map_outputs(labels: &[String], output: &[f32]) -> BTreeMap<String, f64> {
    let values: Vec<f64> = output.iter().map(|&v| v as f64).collect();
    let probabilities = if values.iter().all(|v| (0.0..=1.0).contains(v)) {
        values
    } else {
        softmax(&values)
    };

    labels
        .iter()
        .zip(probabilities)
        .filter(|(label, _)| label.as_str() != SAFE_LABEL)
        .map(|(label, p)| (label.clone(), p))
        .collect()
}

fn softmax(values: &[f64]) -> Vec<f64> {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        DEFAULT_IMAGE_LABELS.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn test_probabilities_pass_through_without_safe() {
        let scores = map_outputs(&labels(), &[0.1, 0.05, 0.75, 0.05, 0.05]);
        assert_eq!(scores.len(), 4);
        assert!(!scores.contains_key("safe"));
        assert!((scores["violence"] - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_logits_are_softmaxed() {
        let scores = map_outputs(&labels(), &[2.0, -1.0, 5.0, -3.0, 0.0]);
        let total: f64 = scores.values().sum();
        assert!(total < 1.0);
        assert!(scores["violence"] > 0.9);
    }

    #[test]
    fn test_preprocess_produces_nchw_buffer() {
        let img = image::RgbImage::from_pixel(10, 10, image::Rgb([255, 0, 0]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let data = preprocess(&bytes).unwrap();
        let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
        assert_eq!(data.len(), 3 * plane);
        assert!((data[0] - 1.0).abs() < 1e-6); // red channel
        assert!(data[plane].abs() < 1e-6); // green channel
    }

    #[test]
    fn test_preprocess_rejects_garbage() {
        assert!(preprocess(b"not an image").is_err());
    }
}
