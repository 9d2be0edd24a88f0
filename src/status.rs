// System status display: sources, models, audit log and counters.

use colored::Colorize;

use crate::config::Config;
use crate::fusion::engine::DecisionFusionEngine;
use crate::output::terminal::display_config;
use crate::signals::download::{image_model_present, text_model_present};

/// Display system status to the terminal.
pub async fn show(engine: &DecisionFusionEngine, config: &Config) {
    let words = engine.get_restricted_words();
    match &config.restricted_words_path {
        Some(path) => println!("Restricted words: {} (from {})", words.len(), path.display()),
        None => println!("Restricted words: {} (built-in list)", words.len()),
    }

    if config.remote_enabled() {
        println!("Remote profanity: enabled ({})", config.profanity_api_url);
    } else {
        println!("Remote profanity: {}", "disabled".dimmed());
        println!("  Set PROFANITY_API_KEY to enable it");
    }

    println!(
        "Text model: {}",
        presence(text_model_present(&config.model_dir))
    );
    println!(
        "Image model: {}",
        presence(image_model_present(&config.model_dir))
    );
    println!("  Model dir: {}", config.model_dir.display());
    if !text_model_present(&config.model_dir) {
        println!("  Run `sieve download-model` to fetch the text model");
    }

    println!("Sources: {}", engine.source_ids().join(", "));

    let log_path = &config.violation_log_path;
    let size = std::fs::metadata(log_path)
        .map(|m| format_bytes(m.len()))
        .unwrap_or_else(|_| "not created yet".to_string());
    println!("Violation log: {} ({})", log_path.display(), size);

    let stats = engine.get_statistics().await;
    println!(
        "Violations: {} total, {} in the last {}h",
        stats.total_violations, stats.recent_violations, stats.recent_window_hours
    );

    display_config(&engine.get_config());
}

fn presence(present: bool) -> colored::ColoredString {
    if present {
        "present".green()
    } else {
        "not found".yellow()
    }
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes_units() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
