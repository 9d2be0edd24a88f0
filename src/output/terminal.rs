// Colored terminal output for verdicts, statistics and configuration.
//
// This module handles all terminal-specific formatting. The main.rs
// command handlers delegate here.

use colored::Colorize;

use crate::fusion::config::FusionConfig;
use crate::fusion::merge::format_score;
use crate::fusion::verdict::{Action, Decision, ModalityCheck, ModerationVerdict};
use crate::recorder::models::ViolationStats;

/// Display one verdict with its reasons and per-source evidence.
pub fn display_verdict(verdict: &ModerationVerdict) {
    println!(
        "\n{}  {}  {}",
        colorize_decision(verdict.decision),
        colorize_action(verdict.action),
        verdict.message().dimmed()
    );
    if let Some(user) = &verdict.user_id {
        println!("  User: {user}");
    }

    if !verdict.reasons.is_empty() {
        println!("\n  Reasons:");
        for reason in &verdict.reasons {
            println!("    {} {}", "!".red(), reason);
        }
    }

    if let Some(check) = &verdict.text_check {
        display_check("Text", check);
    }
    if let Some(check) = &verdict.image_check {
        display_check("Image", check);
    }
    println!();
}

fn display_check(label: &str, check: &ModalityCheck) {
    let status = if check.violated {
        "violated".red().to_string()
    } else {
        "clean".green().to_string()
    };
    println!("\n  {} check: {}", label.bold(), status);

    for (category, detail) in &check.categories {
        let threshold = detail
            .threshold
            .map(format_score)
            .unwrap_or_else(|| "-".to_string());
        let marker = if detail.violated {
            "x".red()
        } else {
            " ".normal()
        };
        println!(
            "    [{}] {:<20} {:>7}  (threshold {})",
            marker,
            category,
            format_score(detail.severity),
            threshold
        );
    }

    for signal in &check.signals {
        if signal.succeeded {
            let severity = signal
                .severity
                .map(format_score)
                .unwrap_or_else(|| "-".to_string());
            println!(
                "    {} {:<18} severity {}",
                "ok".green(),
                signal.source_id,
                severity
            );
        } else {
            println!(
                "    {} {:<18} {}",
                "--".dimmed(),
                signal.source_id,
                signal.error.as_deref().unwrap_or("abstained").dimmed()
            );
        }
    }
}

/// Display violation counters.
pub fn display_statistics(stats: &ViolationStats) {
    println!("\n{}", "=== Violation Statistics ===".bold());
    println!("  Total violations:  {}", stats.total_violations);
    println!("  Text violations:   {}", stats.text_violations);
    println!("  Image violations:  {}", stats.image_violations);
    println!(
        "  Recent ({}h):       {}",
        stats.recent_window_hours, stats.recent_violations
    );
}

pub fn display_config(config: &FusionConfig) {
    println!("\n{}", "=== Fusion Config ===".bold());
    println!("  text_threshold:  {}", format_score(config.text_threshold));
    println!("  image_threshold: {}", format_score(config.image_threshold));
    println!("  auto_block:      {}", on_off(config.auto_block));
    println!("  log_violations:  {}", on_off(config.log_violations));
}

pub fn display_words(words: &[String]) {
    println!(
        "\n{}",
        format!("=== Restricted Words ({}) ===", words.len()).bold()
    );
    for word in words {
        println!("  {word}");
    }
}

fn on_off(flag: bool) -> colored::ColoredString {
    if flag {
        "on".green()
    } else {
        "off".yellow()
    }
}

fn colorize_decision(decision: Decision) -> colored::ColoredString {
    match decision {
        Decision::Safe => "SAFE".green().bold(),
        Decision::Unsafe => "UNSAFE".red().bold(),
    }
}

fn colorize_action(action: Action) -> colored::ColoredString {
    match action {
        Action::Allow => "ALLOW".green(),
        Action::Block => "BLOCK".red(),
    }
}
