//! The error taxonomy stage executors and the dispatcher share.
//!
//! Mirrors the six kinds from the design: a precondition miss is silent (the
//! executor no-ops), transient/permanent remote failures are retryable under
//! backoff, quota exhaustion halts a whole batch, corrupted artifacts need a
//! human, and `Bug` is a programmer error that must never be swallowed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("precondition unmet: {0}")]
    PreconditionUnmet(String),

    #[error("transient remote error: {0}")]
    TransientRemote(String),

    #[error("permanent remote error: {0}")]
    PermanentRemote(String),

    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("data corruption: {0}")]
    DataCorruption(String),

    #[error("bug: {0}")]
    Bug(String),
}

impl StageError {
    /// Whether this error should halt the entire `advance_all` batch rather
    /// than letting the dispatcher continue to the next job.
    pub fn halts_batch(&self) -> bool {
        matches!(self, StageError::QuotaExhausted(_))
    }
}

impl From<rusqlite::Error> for StageError {
    fn from(err: rusqlite::Error) -> Self {
        StageError::DataCorruption(format!("store error: {err}"))
    }
}

impl From<std::io::Error> for StageError {
    fn from(err: std::io::Error) -> Self {
        StageError::TransientRemote(format!("io error: {err}"))
    }
}

impl From<serde_json::Error> for StageError {
    fn from(err: serde_json::Error) -> Self {
        StageError::DataCorruption(format!("json parse error: {err}"))
    }
}
