// Decision fusion: config, verdict types, the pure merge procedure, and
// the engine that drives sources through it.

pub mod config;
pub mod engine;
pub mod merge;
pub mod verdict;

pub use config::{FusionConfig, FusionConfigUpdate};
pub use engine::{DecisionFusionEngine, Submission};
pub use verdict::{Action, Decision, ModerationVerdict};
