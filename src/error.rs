use thiserror::Error;

/// Errors surfaced by the detection core. None of these are fatal to the
/// process: the caller returns to Idle and may retry.
#[derive(Debug, Error)]
pub enum DetectError {
    /// Malformed observation; the frame is rejected without touching any
    /// filter state.
    #[error("invalid observation: {0}")]
    InvalidObservation(String),

    /// `start()` called while a session is already running. The running
    /// session is left untouched.
    #[error("detection session already active")]
    AlreadyActive,

    /// Upstream observation producer failed to initialize or went away.
    #[error("observation source unavailable: {0}")]
    SourceUnavailable(String),
}
