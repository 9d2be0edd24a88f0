// Signal source trait: the uniform capability every detector implements.
//
// The fusion engine holds a list of `Arc<dyn SignalSource>` and calls
// `evaluate` on each one that supports the submitted modality. Sources
// never return errors: anything that goes wrong becomes an abstaining
// outcome (`succeeded == false`) carrying the cause as a string.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which half of a submission a signal looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The broad family a source belongs to. Keyword hits are treated as
/// binary evidence by the merge; the other kinds are graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Keyword,
    Remote,
    Statistical,
}

/// Borrowed view of the payload handed to a source.
#[derive(Debug, Clone, Copy)]
pub enum SignalInput<'a> {
    Text(&'a str),
    Image(&'a [u8]),
}

impl SignalInput<'_> {
    pub fn modality(&self) -> Modality {
        match self {
            SignalInput::Text(_) => Modality::Text,
            SignalInput::Image(_) => Modality::Image,
        }
    }
}

/// Result of one signal source for one modality of one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOutcome {
    pub source_id: String,
    pub kind: SourceKind,
    pub modality: Modality,
    pub succeeded: bool,
    /// Terms the source flagged, in the order the source reported them.
    pub matched_terms: Vec<String>,
    /// Highest category score, absent when the source abstained.
    pub severity: Option<f64>,
    /// Per-category scores in [0, 1]. Categories are independent.
    pub categories: BTreeMap<String, f64>,
    pub error: Option<String>,
}

impl SignalOutcome {
    /// A successful outcome. Scores are clamped into [0, 1] and NaNs dropped.
    pub fn scored(
        source_id: impl Into<String>,
        kind: SourceKind,
        modality: Modality,
        matched_terms: Vec<String>,
        categories: BTreeMap<String, f64>,
    ) -> Self {
        let categories: BTreeMap<String, f64> = categories
            .into_iter()
            .filter(|(_, score)| !score.is_nan())
            .map(|(category, score)| (category, score.clamp(0.0, 1.0)))
            .collect();
        let severity = categories.values().copied().reduce(f64::max);

        Self {
            source_id: source_id.into(),
            kind,
            modality,
            succeeded: true,
            matched_terms,
            severity,
            categories,
            error: None,
        }
    }

    /// The source could not produce a result. Contributes no evidence.
    pub fn abstain(
        source_id: impl Into<String>,
        kind: SourceKind,
        modality: Modality,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            kind,
            modality,
            succeeded: false,
            matched_terms: Vec::new(),
            severity: None,
            categories: BTreeMap::new(),
            error: Some(cause.into()),
        }
    }
}

/// An independent detector contributing evidence toward a verdict.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Stable identifier used in verdicts and logs.
    fn id(&self) -> &str;

    fn kind(&self) -> SourceKind;

    fn supports(&self, modality: Modality) -> bool;

    /// Upper bound the engine waits for this source before treating it
    /// as abstaining.
    fn timeout(&self) -> Duration;

    /// Evaluate one payload. Must not panic; failures become
    /// `SignalOutcome::abstain`.
    async fn evaluate(&self, input: SignalInput<'_>) -> SignalOutcome;
}
