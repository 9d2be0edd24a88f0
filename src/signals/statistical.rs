// Statistical scorer: wraps an opaque trained classifier.
//
// The classifier itself sits behind the CategoryModel trait so the ONNX
// models can be swapped for anything else that turns a payload into
// per-category probabilities. A scorer built without a model (nothing
// downloaded or trained yet) is a normal state: every evaluation abstains
// and the engine carries on with the remaining sources.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::traits::{Modality, SignalInput, SignalOutcome, SignalSource, SourceKind};

/// A trained classifier producing independent per-category scores in [0, 1].
#[async_trait]
pub trait CategoryModel: Send + Sync {
    fn modality(&self) -> Modality;

    async fn score(&self, input: SignalInput<'_>) -> Result<BTreeMap<String, f64>>;
}

pub struct StatisticalScorer {
    id: String,
    modality: Modality,
    model: Option<Arc<dyn CategoryModel>>,
    timeout: Duration,
}

impl StatisticalScorer {
    /// Scorer backed by a loaded model.
    pub fn new(id: impl Into<String>, model: Arc<dyn CategoryModel>, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            modality: model.modality(),
            model: Some(model),
            timeout,
        }
    }

    /// Scorer whose model is not available. Always abstains.
    pub fn unavailable(id: impl Into<String>, modality: Modality) -> Self {
        Self {
            id: id.into(),
            modality,
            model: None,
            timeout: Duration::from_secs(1),
        }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }
}

#[async_trait]
impl SignalSource for StatisticalScorer {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Statistical
    }

    fn supports(&self, modality: Modality) -> bool {
        modality == self.modality
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn evaluate(&self, input: SignalInput<'_>) -> SignalOutcome {
        let modality = input.modality();
        let Some(model) = &self.model else {
            debug!(source = %self.id, "Model not loaded, abstaining");
            return SignalOutcome::abstain(
                &self.id,
                SourceKind::Statistical,
                modality,
                "model not loaded",
            );
        };

        if modality != self.modality {
            return SignalOutcome::abstain(
                &self.id,
                SourceKind::Statistical,
                modality,
                format!("model scores {} only", self.modality),
            );
        }

        match model.score(input).await {
            Ok(categories) => {
                debug!(source = %self.id, categories = categories.len(), "Model scored input");
                SignalOutcome::scored(&self.id, SourceKind::Statistical, modality, Vec::new(), categories)
            }
            Err(e) => {
                warn!(source = %self.id, error = %e, "Model inference failed, abstaining");
                SignalOutcome::abstain(&self.id, SourceKind::Statistical, modality, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedModel(Vec<(&'static str, f64)>);

    #[async_trait]
    impl CategoryModel for FixedModel {
        fn modality(&self) -> Modality {
            Modality::Image
        }

        async fn score(&self, _input: SignalInput<'_>) -> Result<BTreeMap<String, f64>> {
            Ok(self.0.iter().map(|(k, v)| (k.to_string(), *v)).collect())
        }
    }

    struct BrokenModel;

    #[async_trait]
    impl CategoryModel for BrokenModel {
        fn modality(&self) -> Modality {
            Modality::Text
        }

        async fn score(&self, _input: SignalInput<'_>) -> Result<BTreeMap<String, f64>> {
            anyhow::bail!("tensor shape mismatch")
        }
    }

    #[tokio::test]
    async fn test_unavailable_scorer_abstains() {
        let scorer = StatisticalScorer::unavailable("text_model", Modality::Text);
        assert!(!scorer.is_available());
        let outcome = scorer.evaluate(SignalInput::Text("anything")).await;
        assert!(!outcome.succeeded);
        assert_eq!(outcome.error.as_deref(), Some("model not loaded"));
    }

    #[tokio::test]
    async fn test_scores_become_categories() {
        let model = Arc::new(FixedModel(vec![("violence", 0.75), ("nudity", 0.1)]));
        let scorer = StatisticalScorer::new("image_model", model, Duration::from_secs(1));
        assert!(scorer.supports(Modality::Image));
        assert!(!scorer.supports(Modality::Text));

        let outcome = scorer.evaluate(SignalInput::Image(&[1, 2, 3])).await;
        assert!(outcome.succeeded);
        assert_eq!(outcome.categories["violence"], 0.75);
        assert_eq!(outcome.severity, Some(0.75));
    }

    #[tokio::test]
    async fn test_inference_error_abstains() {
        let scorer =
            StatisticalScorer::new("text_model", Arc::new(BrokenModel), Duration::from_secs(1));
        let outcome = scorer.evaluate(SignalInput::Text("hi")).await;
        assert!(!outcome.succeeded);
        assert!(outcome.error.unwrap().contains("shape mismatch"));
    }
}
