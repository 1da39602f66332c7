//! Concrete implementations of the `submit_prompt` interface stage executors
//! depend on: a primary cloud endpoint (Gemini-style) and a local endpoint
//! (Ollama-style), behind one `LanguageModel` trait.

mod gemini;
mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

use thiserror::Error;

/// "Result of language-model call" — a tagged variant callers
/// branch on by kind, never by parsing error strings except to detect
/// `Quota`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmErrorKind {
    Quota,
    Transport,
    Parse,
    Other,
}

#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct LmError {
    pub kind: LmErrorKind,
    pub message: String,
}

impl LmError {
    pub fn new(kind: LmErrorKind, message: impl Into<String>) -> Self {
        LmError {
            kind,
            message: message.into(),
        }
    }

    pub fn is_quota(&self) -> bool {
        self.kind == LmErrorKind::Quota
    }
}

pub type LmResult = Result<String, LmError>;

/// Implemented by every concrete language-model client. Synchronous,
/// matching the engine's single-threaded blocking execution model.
pub trait LanguageModel: Send + Sync {
    fn submit_prompt(&self, prompt: &str) -> LmResult;

    /// A short name for log lines (`"gemini"`, `"ollama"`).
    fn name(&self) -> &'static str;
}

/// An `error_message` containing the substring `quota` (case-insensitively)
/// signals a quota-exceeded condition, per 
pub fn looks_like_quota_error(message: &str) -> bool {
    message.to_lowercase().contains("quota")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_substring_is_case_insensitive() {
        assert!(looks_like_quota_error("Quota Exceeded"));
        assert!(looks_like_quota_error("daily quota exhausted"));
        assert!(!looks_like_quota_error("server unavailable"));
    }
}
