// Caller-facing error taxonomy.
//
// A signal source being unavailable is not an error: it shows up as an
// abstaining SignalOutcome. Audit-log write failures are logged by the
// recorder and never reach the caller. What remains is a rejected
// request or a rejected configuration change.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModerationError {
    /// The submission cannot be moderated (e.g. no text and no image).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A configuration update was rejected; the active config is unchanged.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ModerationError>;
