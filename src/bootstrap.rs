// Engine assembly from environment configuration.
//
// Keyword matching is always on. The remote source is attached when an
// API key is configured. Each statistical scorer is attached either with
// its loaded model or as an always-abstaining placeholder, so verdicts
// show which sources were missing.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::fusion::engine::DecisionFusionEngine;
use crate::recorder::jsonl::JsonlViolationLog;
use crate::recorder::ViolationRecorder;
use crate::signals::download::{image_model_present, text_model_present};
use crate::signals::keyword::KeywordMatcher;
use crate::signals::onnx_image::OnnxImageModel;
use crate::signals::onnx_text::OnnxTextModel;
use crate::signals::remote::RemoteProfanitySignal;
use crate::signals::statistical::StatisticalScorer;
use crate::signals::traits::Modality;

pub const TEXT_SCORER_ID: &str = "text_model";
pub const IMAGE_SCORER_ID: &str = "image_model";

/// Open the JSONL recorder configured by `SIEVE_VIOLATION_LOG`.
pub async fn open_recorder(config: &Config) -> Arc<ViolationRecorder> {
    let log = Arc::new(JsonlViolationLog::new(&config.violation_log_path));
    Arc::new(ViolationRecorder::open(log, config.recent_window_hours).await)
}

/// Build the full engine: keyword matcher, optional remote source, and
/// text/image scorers.
pub async fn build_engine(config: &Config) -> Result<DecisionFusionEngine> {
    let keywords = Arc::new(
        KeywordMatcher::from_source(config.restricted_words_path.as_deref())
            .context("Failed to load restricted words")?,
    );
    let recorder = open_recorder(config).await;

    let mut engine = DecisionFusionEngine::new(keywords, config.fusion.clone(), recorder)
        .context("Invalid initial fusion config")?;

    if config.remote_enabled() {
        let mut remote = RemoteProfanitySignal::new(
            &config.profanity_api_url,
            config.profanity_api_key.clone(),
            config.remote_timeout,
            config.remote_min_interval,
        )?;
        if config.remote_cache_enabled() {
            remote = remote.with_cache(config.remote_cache_ttl, config.remote_cache_capacity);
        }
        info!(url = %config.profanity_api_url, "Remote profanity source enabled");
        engine = engine.with_source(Arc::new(remote));
    } else {
        info!("PROFANITY_API_KEY not set, remote profanity source disabled");
    }

    engine = engine.with_source(Arc::new(text_scorer(config)));
    engine = engine.with_source(Arc::new(image_scorer(config)));

    info!(sources = ?engine.source_ids(), "Fusion engine assembled");
    Ok(engine)
}

fn text_scorer(config: &Config) -> StatisticalScorer {
    if !text_model_present(&config.model_dir) {
        info!(
            dir = %config.model_dir.display(),
            "Text model not found, run `sieve download-model` to enable it"
        );
        return StatisticalScorer::unavailable(TEXT_SCORER_ID, Modality::Text);
    }
    match OnnxTextModel::load(&config.model_dir) {
        Ok(model) => StatisticalScorer::new(TEXT_SCORER_ID, Arc::new(model), config.model_timeout),
        Err(e) => {
            warn!(error = %e, "Text model failed to load, scorer will abstain");
            StatisticalScorer::unavailable(TEXT_SCORER_ID, Modality::Text)
        }
    }
}

fn image_scorer(config: &Config) -> StatisticalScorer {
    if !image_model_present(&config.model_dir) {
        info!(dir = %config.model_dir.display(), "Image model not found");
        return StatisticalScorer::unavailable(IMAGE_SCORER_ID, Modality::Image);
    }
    match OnnxImageModel::load(&config.model_dir) {
        Ok(model) => {
            StatisticalScorer::new(IMAGE_SCORER_ID, Arc::new(model), config.model_timeout)
        }
        Err(e) => {
            warn!(error = %e, "Image model failed to load, scorer will abstain");
            StatisticalScorer::unavailable(IMAGE_SCORER_ID, Modality::Image)
        }
    }
}
