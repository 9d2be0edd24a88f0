// Signal sources: independent detectors behind one trait.
//
// KeywordMatcher (local term list), RemoteProfanitySignal (third-party
// API) and StatisticalScorer (ONNX text/image classifiers) all implement
// SignalSource, so the fusion engine iterates over a list instead of
// hardcoding call sites.

pub mod cache;
pub mod download;
pub mod keyword;
pub mod onnx_image;
pub mod onnx_text;
pub mod rate_limiter;
pub mod remote;
pub mod statistical;
pub mod traits;
