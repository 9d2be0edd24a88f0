// Fusion configuration: thresholds and the block/log switches.
//
// Held by the engine behind SharedConfig. Every check reads one snapshot
// for its whole pass; updates validate first and then swap in a complete
// new value, so no check ever sees a half-applied update.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{ModerationError, Result};
use crate::signals::traits::Modality;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Aggregated text severity at or above this is a violation.
    pub text_threshold: f64,
    /// Aggregated image severity at or above this is a violation.
    pub image_threshold: f64,
    /// Turn UNSAFE decisions into BLOCK actions.
    pub auto_block: bool,
    /// Forward UNSAFE verdicts to the violation recorder.
    pub log_violations: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            text_threshold: 0.5,
            image_threshold: 0.7,
            auto_block: true,
            log_violations: true,
        }
    }
}

impl FusionConfig {
    pub fn threshold(&self, modality: Modality) -> f64 {
        match modality {
            Modality::Text => self.text_threshold,
            Modality::Image => self.image_threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("text_threshold", self.text_threshold),
            ("image_threshold", self.image_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ModerationError::InvalidConfig(format!(
                    "{name} must be between 0 and 1, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Apply a partial update, returning the merged config.
    pub fn merged(&self, update: &FusionConfigUpdate) -> Self {
        Self {
            text_threshold: update.text_threshold.unwrap_or(self.text_threshold),
            image_threshold: update.image_threshold.unwrap_or(self.image_threshold),
            auto_block: update.auto_block.unwrap_or(self.auto_block),
            log_violations: update.log_violations.unwrap_or(self.log_violations),
        }
    }
}

/// Partial update: absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FusionConfigUpdate {
    #[serde(default)]
    pub text_threshold: Option<f64>,
    #[serde(default)]
    pub image_threshold: Option<f64>,
    #[serde(default)]
    pub auto_block: Option<bool>,
    #[serde(default)]
    pub log_violations: Option<bool>,
}

impl FusionConfigUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Copy-on-write holder for the active config.
#[derive(Debug)]
pub struct SharedConfig {
    current: RwLock<Arc<FusionConfig>>,
}

impl SharedConfig {
    pub fn new(config: FusionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
        })
    }

    pub fn snapshot(&self) -> Arc<FusionConfig> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Validate and apply `update`. On error the active config is untouched.
    pub fn update(&self, update: &FusionConfigUpdate) -> Result<FusionConfig> {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next = guard.merged(update);
        next.validate()?;
        *guard = Arc::new(next.clone());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FusionConfig::default();
        assert_eq!(config.text_threshold, 0.5);
        assert_eq!(config.image_threshold, 0.7);
        assert!(config.auto_block);
        assert!(config.log_violations);
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let shared = SharedConfig::new(FusionConfig::default()).unwrap();
        let updated = shared
            .update(&FusionConfigUpdate {
                auto_block: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert!(!updated.auto_block);
        assert_eq!(updated.text_threshold, 0.5);
        assert_eq!(*shared.snapshot(), updated);
    }

    #[test]
    fn test_out_of_range_threshold_rejected_and_config_unchanged() {
        let shared = SharedConfig::new(FusionConfig::default()).unwrap();
        let err = shared
            .update(&FusionConfigUpdate {
                text_threshold: Some(0.3),
                image_threshold: Some(1.5),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ModerationError::InvalidConfig(_)));
        assert_eq!(*shared.snapshot(), FusionConfig::default());
    }

    #[test]
    fn test_update_from_json_partial() {
        let update: FusionConfigUpdate = serde_json::from_str(r#"{"image_threshold": 0.9}"#).unwrap();
        assert_eq!(update.image_threshold, Some(0.9));
        assert!(update.text_threshold.is_none());
        assert!(!update.is_empty());
    }

    #[test]
    fn test_held_snapshot_survives_update() {
        let shared = SharedConfig::new(FusionConfig::default()).unwrap();
        let before = shared.snapshot();
        shared
            .update(&FusionConfigUpdate {
                text_threshold: Some(0.9),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(before.text_threshold, 0.5);
        assert_eq!(shared.snapshot().text_threshold, 0.9);
    }
}
