// Sieve: signal-fusion content moderation
//
// This is the library root. Each module corresponds to a major subsystem
// of the moderation pipeline: independent signal sources, the fusion
// engine that merges them, and the audit recorder behind it.

pub mod batch;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod fusion;
pub mod output;
pub mod recorder;
pub mod signals;
pub mod status;
