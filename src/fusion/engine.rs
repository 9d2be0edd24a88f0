// DecisionFusionEngine: the orchestrator.
//
// One pass per submission:
//   1. dispatch every source that supports each present modality, all at
//      once, each under its own timeout
//   2. fuse the outcomes against a single config snapshot
//   3. record UNSAFE verdicts when logging is on
//
// A source that times out is dropped mid-flight and replaced by an
// abstaining outcome, so the pass is bounded by the slowest per-source
// timeout. The engine never retries. Recording a violation has its own
// bound; a log that stalls past it counts as a failed write.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::config::{FusionConfig, FusionConfigUpdate, SharedConfig};
use super::merge;
use super::verdict::ModerationVerdict;
use crate::error::{ModerationError, Result};
use crate::output::truncate_chars;
use crate::recorder::models::ViolationStats;
use crate::recorder::ViolationRecorder;
use crate::signals::keyword::KeywordMatcher;
use crate::signals::traits::{Modality, SignalInput, SignalOutcome, SignalSource};

/// Largest batch accepted by `check_batch`.
pub const MAX_BATCH_SIZE: usize = 100;

/// Characters of text kept in the audit-log excerpt.
pub const EXCERPT_CHARS: usize = 100;

/// How long a check waits for its violation record to be written.
pub const DEFAULT_RECORD_TIMEOUT: Duration = Duration::from_secs(5);

/// Content submitted for moderation. Blank text and empty images count
/// as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub text: Option<String>,
    pub image: Option<Vec<u8>>,
    pub user_id: Option<String>,
}

impl Submission {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        Self {
            image: Some(bytes),
            ..Default::default()
        }
    }

    pub fn with_image(mut self, bytes: Vec<u8>) -> Self {
        self.image = Some(bytes);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    fn present_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    fn present_image(&self) -> Option<&[u8]> {
        self.image.as_deref().filter(|b| !b.is_empty())
    }

    /// Modalities actually carried, text first.
    pub fn modalities(&self) -> Vec<Modality> {
        let mut modalities = Vec::with_capacity(2);
        if self.present_text().is_some() {
            modalities.push(Modality::Text);
        }
        if self.present_image().is_some() {
            modalities.push(Modality::Image);
        }
        modalities
    }

    fn inputs(&self) -> Vec<SignalInput<'_>> {
        let mut inputs = Vec::with_capacity(2);
        if let Some(text) = self.present_text() {
            inputs.push(SignalInput::Text(text));
        }
        if let Some(bytes) = self.present_image() {
            inputs.push(SignalInput::Image(bytes));
        }
        inputs
    }
}

/// The audit-log excerpt for a submission.
pub fn submission_excerpt(submission: &Submission) -> String {
    let text = submission
        .present_text()
        .map(|t| truncate_chars(t, EXCERPT_CHARS));
    let image_len = submission.present_image().map(<[u8]>::len);
    match (text, image_len) {
        (Some(text), Some(len)) => format!("{text} [+ image: {len} bytes]"),
        (Some(text), None) => text,
        (None, Some(len)) => format!("[image: {len} bytes]"),
        (None, None) => String::new(),
    }
}

pub struct DecisionFusionEngine {
    keywords: Arc<KeywordMatcher>,
    sources: Vec<Arc<dyn SignalSource>>,
    config: SharedConfig,
    recorder: Arc<ViolationRecorder>,
    record_timeout: Duration,
}

impl DecisionFusionEngine {
    /// Build an engine with the keyword matcher as its first source.
    /// Further sources are attached with `with_source`.
    pub fn new(
        keywords: Arc<KeywordMatcher>,
        config: FusionConfig,
        recorder: Arc<ViolationRecorder>,
    ) -> Result<Self> {
        let config = SharedConfig::new(config)?;
        let sources: Vec<Arc<dyn SignalSource>> = vec![keywords.clone()];
        Ok(Self {
            keywords,
            sources,
            config,
            recorder,
            record_timeout: DEFAULT_RECORD_TIMEOUT,
        })
    }

    pub fn with_record_timeout(mut self, timeout: Duration) -> Self {
        self.record_timeout = timeout;
        self
    }

    pub fn with_source(mut self, source: Arc<dyn SignalSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id().to_string()).collect()
    }

    pub fn recorder(&self) -> &Arc<ViolationRecorder> {
        &self.recorder
    }

    /// Moderate one submission.
    ///
    /// Errors only with `InvalidInput` when the submission carries neither
    /// text nor an image. Source failures degrade to abstentions.
    pub async fn check_content(&self, submission: &Submission) -> Result<ModerationVerdict> {
        let inputs = submission.inputs();
        if inputs.is_empty() {
            return Err(ModerationError::InvalidInput(
                "Submission must contain text or an image".to_string(),
            ));
        }

        let config = self.config.snapshot();
        let started = Instant::now();

        let mut pending = Vec::new();
        for source in &self.sources {
            for &input in &inputs {
                if source.supports(input.modality()) {
                    pending.push(run_source(source.as_ref(), input));
                }
            }
        }
        let outcomes: Vec<SignalOutcome> = join_all(pending).await;

        let abstained = outcomes.iter().filter(|o| !o.succeeded).count();
        let verdict = merge::fuse(
            &outcomes,
            &config,
            &submission.modalities(),
            submission.user_id.clone(),
            Utc::now(),
        );

        debug!(
            decision = %verdict.decision,
            action = %verdict.action,
            signals = outcomes.len(),
            abstained,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fusion complete"
        );

        if verdict.is_unsafe() && config.log_violations {
            let excerpt = submission_excerpt(submission);
            let write = self.recorder.record(&verdict, &excerpt);
            if tokio::time::timeout(self.record_timeout, write).await.is_err() {
                error!(
                    log = %self.recorder.describe_log(),
                    timeout_ms = self.record_timeout.as_millis() as u64,
                    "Failed to record violation: write timed out"
                );
            }
        }

        Ok(verdict)
    }

    /// Moderate up to `MAX_BATCH_SIZE` submissions in order. Each item gets
    /// its own result so one invalid entry does not sink the batch.
    pub async fn check_batch(
        &self,
        submissions: &[Submission],
    ) -> Result<Vec<Result<ModerationVerdict>>> {
        if submissions.len() > MAX_BATCH_SIZE {
            return Err(ModerationError::InvalidInput(format!(
                "Batch of {} exceeds the maximum of {MAX_BATCH_SIZE} items",
                submissions.len()
            )));
        }

        let mut results = Vec::with_capacity(submissions.len());
        for submission in submissions {
            results.push(self.check_content(submission).await);
        }
        Ok(results)
    }

    pub async fn get_statistics(&self) -> ViolationStats {
        self.recorder.get_statistics().await
    }

    pub fn get_config(&self) -> FusionConfig {
        self.config.snapshot().as_ref().clone()
    }

    /// Apply a partial update atomically. On error the active config is
    /// left unchanged.
    pub fn update_config(&self, update: &FusionConfigUpdate) -> Result<FusionConfig> {
        let updated = self.config.update(update)?;
        info!(
            text_threshold = updated.text_threshold,
            image_threshold = updated.image_threshold,
            auto_block = updated.auto_block,
            log_violations = updated.log_violations,
            "Fusion config updated"
        );
        Ok(updated)
    }

    /// Current restricted terms, sorted.
    pub fn get_restricted_words(&self) -> Vec<String> {
        self.keywords.terms().snapshot().iter().cloned().collect()
    }

    /// Add terms; returns how many were new.
    pub fn add_restricted_words<I, S>(&self, words: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = self.keywords.terms().extend(words);
        info!(
            added,
            total = self.keywords.terms().len(),
            "Restricted words added"
        );
        added
    }

    pub fn replace_restricted_words<I, S>(&self, words: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.keywords.terms().replace(words);
        info!(total = self.keywords.terms().len(), "Restricted words replaced");
    }
}

async fn run_source(source: &dyn SignalSource, input: SignalInput<'_>) -> SignalOutcome {
    let timeout = source.timeout();
    match tokio::time::timeout(timeout, source.evaluate(input)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(
                source = source.id(),
                timeout_ms = timeout.as_millis() as u64,
                "Signal source timed out"
            );
            SignalOutcome::abstain(
                source.id(),
                source.kind(),
                input.modality(),
                format!("timed out after {}ms", timeout.as_millis()),
            )
        }
    }
}
