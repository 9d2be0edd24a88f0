use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::fusion::config::FusionConfig;
use crate::recorder::{DEFAULT_RECENT_WINDOW_HOURS, MAX_RECENT_WINDOW_HOURS};
use crate::signals::remote::DEFAULT_PROFANITY_API_URL;

/// Central configuration loaded from environment variables.
///
/// Everything is optional. The .env file is loaded automatically at
/// startup via dotenvy, and a malformed value is an error naming the
/// variable rather than a silent fallback.
#[derive(Debug, Clone)]
pub struct Config {
    /// api-ninjas key. The remote profanity source is enabled only when set.
    pub profanity_api_key: String,
    pub profanity_api_url: String,
    pub remote_timeout: Duration,
    /// Minimum spacing between consecutive remote calls.
    pub remote_min_interval: Duration,
    /// Zero disables the verdict cache.
    pub remote_cache_ttl: Duration,
    pub remote_cache_capacity: usize,
    /// Directory containing the ONNX model files
    pub model_dir: PathBuf,
    pub model_timeout: Duration,
    /// Newline-delimited restricted term file (None = built-in list)
    pub restricted_words_path: Option<PathBuf>,
    pub violation_log_path: PathBuf,
    pub recent_window_hours: i64,
    /// Initial fusion settings; changed at runtime through update_config.
    pub fusion: FusionConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        let defaults = FusionConfig::default();
        let fusion = FusionConfig {
            text_threshold: env_parse("SIEVE_TEXT_THRESHOLD", defaults.text_threshold)?,
            image_threshold: env_parse("SIEVE_IMAGE_THRESHOLD", defaults.image_threshold)?,
            auto_block: env_parse("SIEVE_AUTO_BLOCK", defaults.auto_block)?,
            log_violations: env_parse("SIEVE_LOG_VIOLATIONS", defaults.log_violations)?,
        };
        fusion
            .validate()
            .context("Invalid SIEVE_TEXT_THRESHOLD or SIEVE_IMAGE_THRESHOLD")?;

        let model_dir = env::var("SIEVE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| crate::signals::download::default_model_dir());

        Ok(Self {
            profanity_api_key: env::var("PROFANITY_API_KEY").unwrap_or_default(),
            profanity_api_url: env::var("PROFANITY_API_URL")
                .unwrap_or_else(|_| DEFAULT_PROFANITY_API_URL.to_string()),
            remote_timeout: Duration::from_millis(env_parse("SIEVE_REMOTE_TIMEOUT_MS", 10_000)?),
            remote_min_interval: Duration::from_millis(env_parse(
                "SIEVE_REMOTE_MIN_INTERVAL_MS",
                500,
            )?),
            remote_cache_ttl: Duration::from_secs(env_parse("SIEVE_REMOTE_CACHE_TTL_SECS", 300)?),
            remote_cache_capacity: env_parse("SIEVE_REMOTE_CACHE_CAPACITY", 1024)?,
            model_dir,
            model_timeout: Duration::from_millis(env_parse("SIEVE_MODEL_TIMEOUT_MS", 5_000)?),
            restricted_words_path: env::var("SIEVE_RESTRICTED_WORDS")
                .ok()
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            violation_log_path: env::var("SIEVE_VIOLATION_LOG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./content_violations.log")),
            recent_window_hours: recent_window_hours(env_parse(
                "SIEVE_RECENT_WINDOW_HOURS",
                DEFAULT_RECENT_WINDOW_HOURS,
            )?)?,
            fusion,
        })
    }

    /// Whether the remote profanity source should be attached.
    pub fn remote_enabled(&self) -> bool {
        !self.profanity_api_key.trim().is_empty()
    }

    pub fn remote_cache_enabled(&self) -> bool {
        !self.remote_cache_ttl.is_zero() && self.remote_cache_capacity > 0
    }
}

/// Reject recency windows outside 1..=MAX_RECENT_WINDOW_HOURS.
fn recent_window_hours(hours: i64) -> Result<i64> {
    if !(1..=MAX_RECENT_WINDOW_HOURS).contains(&hours) {
        anyhow::bail!(
            "SIEVE_RECENT_WINDOW_HOURS={hours} is out of range (1..={MAX_RECENT_WINDOW_HOURS})"
        );
    }
    Ok(hours)
}

/// Read and parse `name`, falling back to `default` when unset or blank.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(name, &raw),
        _ => Ok(default),
    }
}

fn parse_value<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{name}={raw:?} is not valid: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_accepts_trimmed_input() {
        assert_eq!(parse_value::<u64>("X", " 250 ").unwrap(), 250);
        assert!(parse_value::<bool>("X", "true").unwrap());
    }

    #[test]
    fn test_parse_value_error_names_variable() {
        let err = parse_value::<f64>("SIEVE_TEXT_THRESHOLD", "high").unwrap_err();
        assert!(err.to_string().contains("SIEVE_TEXT_THRESHOLD"));
    }

    #[test]
    fn test_recent_window_range() {
        assert_eq!(recent_window_hours(24).unwrap(), 24);
        assert_eq!(recent_window_hours(MAX_RECENT_WINDOW_HOURS).unwrap(), MAX_RECENT_WINDOW_HOURS);
        for bad in [0, -5, MAX_RECENT_WINDOW_HOURS + 1, 3_000_000_000] {
            let err = recent_window_hours(bad).unwrap_err();
            assert!(err.to_string().contains("SIEVE_RECENT_WINDOW_HOURS"));
        }
    }

    #[test]
    fn test_unset_variable_uses_default() {
        let value: u64 = env_parse("SIEVE_TEST_DEFINITELY_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
