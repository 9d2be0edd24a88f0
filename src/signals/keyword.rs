// Local restricted-term matcher.
//
// Matching is a case-insensitive substring check of every restricted term
// against the normalized submission text. It is purely local and always
// succeeds. Any hit contributes a flat severity; the merge treats keyword
// hits as unconditional violations regardless of thresholds.
//
// The term set is shared across concurrent checks. Updates build a new set
// and swap it in, so a reader sees either the whole old set or the whole
// new one.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use super::traits::{Modality, SignalInput, SignalOutcome, SignalSource, SourceKind};

/// Category name keyword hits are reported under.
pub const RESTRICTED_TERMS_CATEGORY: &str = "restricted_terms";

/// Severity reported when at least one restricted term is present.
pub const KEYWORD_SEVERITY: f64 = 0.2;

/// Built-in list used when no term file is configured.
pub const DEFAULT_RESTRICTED_TERMS: &[&str] = &[
    "hate",
    "violence",
    "abuse",
    "harassment",
    "discrimination",
    "racism",
    "sexism",
    "homophobia",
    "bullying",
    "threats",
    "illegal",
    "drugs",
    "weapons",
    "terrorism",
    "extremism",
    "spam",
    "scam",
    "fake_news",
    "misinformation",
];

/// Lower-case and trim a term or a piece of text.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Parse a newline-delimited term list. Blank lines and `#` comments are
/// skipped; entries are normalized.
pub fn parse_term_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(normalize)
        .collect()
}

/// Read a newline-delimited term file.
pub fn load_term_file(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read restricted words from {}", path.display()))?;
    Ok(parse_term_list(&contents))
}

/// Process-wide set of normalized restricted terms.
#[derive(Debug, Default)]
pub struct RestrictedTermSet {
    terms: RwLock<Arc<BTreeSet<String>>>,
}

impl RestrictedTermSet {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = Self::default();
        set.replace(terms);
        set
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_RESTRICTED_TERMS.iter())
    }

    /// Current snapshot. Held snapshots are unaffected by later updates.
    pub fn snapshot(&self) -> Arc<BTreeSet<String>> {
        let guard = self.terms.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Union new terms into the set. Returns how many were not already present.
    pub fn extend<I, S>(&self, terms: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let incoming: Vec<String> = terms
            .into_iter()
            .map(|t| normalize(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();

        let mut guard = self.terms.write().unwrap_or_else(|e| e.into_inner());
        let mut next = BTreeSet::clone(&guard);
        let before = next.len();
        next.extend(incoming);
        let added = next.len() - before;
        *guard = Arc::new(next);
        added
    }

    /// Replace the whole set.
    pub fn replace<I, S>(&self, terms: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let next: BTreeSet<String> = terms
            .into_iter()
            .map(|t| normalize(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        let mut guard = self.terms.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(next);
    }
}

/// Restricted terms present in `text`, ordered by first occurrence
/// (ties broken alphabetically).
pub fn find_terms(terms: &BTreeSet<String>, text: &str) -> Vec<String> {
    let haystack = normalize(text);
    if haystack.is_empty() {
        return Vec::new();
    }

    let mut hits: Vec<(usize, &String)> = terms
        .iter()
        .filter_map(|term| haystack.find(term.as_str()).map(|pos| (pos, term)))
        .collect();
    hits.sort();
    hits.into_iter().map(|(_, term)| term.clone()).collect()
}

/// Signal source backed by a shared `RestrictedTermSet`.
pub struct KeywordMatcher {
    terms: Arc<RestrictedTermSet>,
}

impl KeywordMatcher {
    pub const ID: &'static str = "keyword";

    pub fn new(terms: Arc<RestrictedTermSet>) -> Self {
        Self { terms }
    }

    /// Build a matcher from a term file, or the built-in list when `path` is None.
    pub fn from_source(path: Option<&Path>) -> Result<Self> {
        let terms = match path {
            Some(path) => {
                let list = load_term_file(path)?;
                info!(path = %path.display(), count = list.len(), "Loaded restricted words from file");
                RestrictedTermSet::new(list)
            }
            None => {
                info!(
                    count = DEFAULT_RESTRICTED_TERMS.len(),
                    "Loaded default restricted words"
                );
                RestrictedTermSet::with_defaults()
            }
        };
        Ok(Self::new(Arc::new(terms)))
    }

    pub fn terms(&self) -> &Arc<RestrictedTermSet> {
        &self.terms
    }

    /// Match `text` against the current term set.
    pub fn check(&self, text: &str) -> SignalOutcome {
        let snapshot = self.terms.snapshot();
        let matched = find_terms(&snapshot, text);

        let mut categories = BTreeMap::new();
        if !matched.is_empty() {
            categories.insert(RESTRICTED_TERMS_CATEGORY.to_string(), KEYWORD_SEVERITY);
        }
        debug!(matched = matched.len(), "Keyword check complete");

        SignalOutcome::scored(Self::ID, SourceKind::Keyword, Modality::Text, matched, categories)
    }
}

#[async_trait]
impl SignalSource for KeywordMatcher {
    fn id(&self) -> &str {
        Self::ID
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Keyword
    }

    fn supports(&self, modality: Modality) -> bool {
        modality == Modality::Text
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn evaluate(&self, input: SignalInput<'_>) -> SignalOutcome {
        match input {
            SignalInput::Text(text) => self.check(text),
            SignalInput::Image(_) => SignalOutcome::abstain(
                Self::ID,
                SourceKind::Keyword,
                Modality::Image,
                "keyword matching does not apply to images",
            ),
        }
    }
}
