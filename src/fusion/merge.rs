// The merge procedure: signal outcomes in, one verdict out.
//
// 1. Abstaining outcomes are kept for the audit trail but contribute no
//    evidence.
// 2. Keyword hits are binary: any hit is a violation whatever the
//    thresholds say.
// 3. Graded sources are aggregated per category by taking the max across
//    sources of the same modality, then compared (>=) against that
//    modality's threshold.
// 4. Reasons come out in a fixed order: keyword reasons first, then text
//    categories, then image categories, each alphabetically.
//
// This module is pure; the engine supplies the outcomes and the clock.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::config::FusionConfig;
use super::verdict::{Action, CategoryDetail, Decision, ModalityCheck, ModerationVerdict};
use crate::signals::keyword::RESTRICTED_TERMS_CATEGORY;
use crate::signals::traits::{Modality, SignalOutcome, SourceKind};

/// Render a score rounded to 4 decimals, shortest form (0.75, 0.7).
pub fn format_score(score: f64) -> String {
    let rounded = (score * 10_000.0).round() / 10_000.0;
    format!("{rounded}")
}

/// Merge all outcomes of one submission into a verdict.
///
/// `modalities` lists what the submission carried; a modality with no
/// outcomes at all still gets an (empty, non-violated) check.
pub fn fuse(
    outcomes: &[SignalOutcome],
    config: &FusionConfig,
    modalities: &[Modality],
    user_id: Option<String>,
    timestamp: DateTime<Utc>,
) -> ModerationVerdict {
    let mut text_check = None;
    let mut image_check = None;
    for &modality in modalities {
        let check = check_modality(outcomes, config, modality);
        match modality {
            Modality::Text => text_check = Some(check),
            Modality::Image => image_check = Some(check),
        }
    }

    let checks: Vec<(Modality, &ModalityCheck)> = [
        (Modality::Text, text_check.as_ref()),
        (Modality::Image, image_check.as_ref()),
    ]
    .into_iter()
    .filter_map(|(m, check)| check.map(|c| (m, c)))
    .collect();

    let mut reasons = Vec::new();
    for (modality, check) in &checks {
        if !check.restricted_terms.is_empty() {
            reasons.push(format!(
                "{} contains restricted words: {}",
                capitalize(modality.as_str()),
                check.restricted_terms.join(", ")
            ));
        }
    }
    for (_, check) in &checks {
        for (category, detail) in &check.categories {
            if let (true, Some(threshold)) = (detail.violated, detail.threshold) {
                reasons.push(format!(
                    "{} severity {} exceeds threshold {}",
                    category,
                    format_score(detail.severity),
                    format_score(threshold)
                ));
            }
        }
    }

    let decision = if checks.iter().any(|(_, c)| c.violated) {
        Decision::Unsafe
    } else {
        Decision::Safe
    };
    let action = if decision == Decision::Unsafe && config.auto_block {
        Action::Block
    } else {
        Action::Allow
    };

    ModerationVerdict {
        decision,
        action,
        reasons,
        text_check,
        image_check,
        user_id,
        timestamp,
    }
}

fn check_modality(
    outcomes: &[SignalOutcome],
    config: &FusionConfig,
    modality: Modality,
) -> ModalityCheck {
    let signals: Vec<SignalOutcome> = outcomes
        .iter()
        .filter(|o| o.modality == modality)
        .cloned()
        .collect();
    let threshold = config.threshold(modality);

    let mut categories: BTreeMap<String, CategoryDetail> = BTreeMap::new();
    let mut restricted_terms: Vec<String> = Vec::new();

    for outcome in signals.iter().filter(|o| o.succeeded) {
        if outcome.kind == SourceKind::Keyword {
            for term in &outcome.matched_terms {
                if !restricted_terms.contains(term) {
                    restricted_terms.push(term.clone());
                }
            }
            continue;
        }

        for (category, &score) in &outcome.categories {
            let detail = categories
                .entry(category.clone())
                .or_insert_with(|| CategoryDetail {
                    severity: 0.0,
                    threshold: Some(threshold),
                    violated: false,
                    sources: BTreeMap::new(),
                });
            let entry = detail.sources.entry(outcome.source_id.clone()).or_insert(score);
            *entry = entry.max(score);
            detail.severity = detail.severity.max(score);
            detail.violated = detail.severity >= threshold;
        }
    }

    if !restricted_terms.is_empty() {
        let keyword_scores: BTreeMap<String, f64> = signals
            .iter()
            .filter(|o| o.succeeded && o.kind == SourceKind::Keyword && !o.matched_terms.is_empty())
            .filter_map(|o| o.severity.map(|s| (o.source_id.clone(), s)))
            .collect();
        let severity = keyword_scores.values().copied().fold(0.0, f64::max);
        let detail = categories
            .entry(RESTRICTED_TERMS_CATEGORY.to_string())
            .or_insert_with(|| CategoryDetail {
                severity: 0.0,
                threshold: None,
                violated: true,
                sources: BTreeMap::new(),
            });
        detail.severity = detail.severity.max(severity);
        detail.threshold = None;
        detail.violated = true;
        detail.sources.extend(keyword_scores);
    }

    let violated = categories.values().any(|d| d.violated);

    ModalityCheck {
        violated,
        restricted_terms,
        categories,
        signals,
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graded(source: &str, modality: Modality, scores: &[(&str, f64)]) -> SignalOutcome {
        SignalOutcome::scored(
            source,
            SourceKind::Statistical,
            modality,
            vec![],
            scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        )
    }

    fn keyword(terms: &[&str]) -> SignalOutcome {
        let mut categories = BTreeMap::new();
        if !terms.is_empty() {
            categories.insert(RESTRICTED_TERMS_CATEGORY.to_string(), 0.2);
        }
        SignalOutcome::scored(
            "keyword",
            SourceKind::Keyword,
            Modality::Text,
            terms.iter().map(|t| t.to_string()).collect(),
            categories,
        )
    }

    fn run(outcomes: &[SignalOutcome], config: &FusionConfig, modalities: &[Modality]) -> ModerationVerdict {
        fuse(outcomes, config, modalities, None, Utc::now())
    }

    #[test]
    fn test_format_score_shortest_form() {
        assert_eq!(format_score(0.75), "0.75");
        assert_eq!(format_score(0.7), "0.7");
        assert_eq!(format_score(0.750000011920929), "0.75");
        assert_eq!(format_score(1.0), "1");
    }

    #[test]
    fn test_max_across_sources_not_average() {
        let outcomes = vec![
            graded("a", Modality::Text, &[("insult", 0.9)]),
            graded("b", Modality::Text, &[("insult", 0.1)]),
        ];
        let v = run(&outcomes, &FusionConfig::default(), &[Modality::Text]);
        let detail = &v.text_check.as_ref().unwrap().categories["insult"];
        assert_eq!(detail.severity, 0.9);
        assert_eq!(detail.sources.len(), 2);
        assert_eq!(v.decision, Decision::Unsafe);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let outcomes = vec![graded("m", Modality::Text, &[("threat", 0.5)])];
        let v = run(&outcomes, &FusionConfig::default(), &[Modality::Text]);
        assert_eq!(v.decision, Decision::Unsafe);
        assert_eq!(v.reasons, vec!["threat severity 0.5 exceeds threshold 0.5"]);
    }

    #[test]
    fn test_keyword_hit_ignores_threshold() {
        let config = FusionConfig {
            text_threshold: 1.0,
            ..Default::default()
        };
        let v = run(&[keyword(&["hate"])], &config, &[Modality::Text]);
        assert_eq!(v.decision, Decision::Unsafe);
        assert_eq!(v.reasons, vec!["Text contains restricted words: hate"]);
        let detail = &v.text_check.unwrap().categories[RESTRICTED_TERMS_CATEGORY];
        assert!(detail.violated);
        assert!(detail.threshold.is_none());
    }

    #[test]
    fn test_abstentions_contribute_nothing() {
        let outcomes = vec![
            SignalOutcome::abstain("remote", SourceKind::Remote, Modality::Text, "timeout"),
            keyword(&[]),
        ];
        let v = run(&outcomes, &FusionConfig::default(), &[Modality::Text]);
        assert_eq!(v.decision, Decision::Safe);
        assert!(v.reasons.is_empty());
        // Abstention still recorded for the audit trail
        assert_eq!(v.text_check.unwrap().signals.len(), 2);
    }

    #[test]
    fn test_reason_ordering_keyword_then_text_then_image() {
        let outcomes = vec![
            graded("img", Modality::Image, &[("violence", 0.8), ("nudity", 0.9)]),
            graded("txt", Modality::Text, &[("threat", 0.6), ("insult", 0.7)]),
            keyword(&["scam", "hate"]),
        ];
        let v = run(&outcomes, &FusionConfig::default(), &[Modality::Text, Modality::Image]);
        assert_eq!(
            v.reasons,
            vec![
                "Text contains restricted words: scam, hate",
                "insult severity 0.7 exceeds threshold 0.5",
                "threat severity 0.6 exceeds threshold 0.5",
                "nudity severity 0.9 exceeds threshold 0.7",
                "violence severity 0.8 exceeds threshold 0.7",
            ]
        );
    }

    #[test]
    fn test_image_scores_do_not_leak_into_text() {
        let outcomes = vec![graded("img", Modality::Image, &[("violence", 0.6)])];
        let v = run(&outcomes, &FusionConfig::default(), &[Modality::Text, Modality::Image]);
        // 0.6 is above the text threshold but below the image threshold
        assert_eq!(v.decision, Decision::Safe);
        assert!(v.text_check.unwrap().categories.is_empty());
    }

    #[test]
    fn test_action_truth_table() {
        let hit = vec![keyword(&["hate"])];
        let clean = vec![keyword(&[])];
        for (outcomes, auto_block, expected) in [
            (&hit, true, Action::Block),
            (&hit, false, Action::Allow),
            (&clean, true, Action::Allow),
            (&clean, false, Action::Allow),
        ] {
            let config = FusionConfig {
                auto_block,
                ..Default::default()
            };
            let v = run(outcomes, &config, &[Modality::Text]);
            assert_eq!(v.action, expected);
        }
    }
}
