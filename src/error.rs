//! Error types for the call engine and the orchestrator.

use thiserror::Error;

/// Why a streaming call (or one attempt of it) did not produce an answer.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallError {
    /// The backend stream finished without any text.
    #[error("Error: {backend} has given no response!")]
    EmptyResponse { backend: String },

    /// The request or the stream itself failed.
    #[error("call to {backend} failed: {message}")]
    Transport { backend: String, message: String },

    /// The user stopped the call.
    #[error("call cancelled")]
    Cancelled,

    /// Every configured backend failed for this prompt.
    #[error("all {attempts} backends failed; last error: {last}")]
    ExhaustedFallback { attempts: usize, last: Box<CallError> },

    /// There is nothing to call.
    #[error("no backends configured")]
    NoBackends,
}

impl CallError {
    /// Whether the fallback chain should move on to the next backend.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CallError::EmptyResponse { .. } | CallError::Transport { .. }
        )
    }

    pub(crate) fn transport(backend: &str, err: &anyhow::Error) -> Self {
        CallError::Transport {
            backend: backend.to_string(),
            message: format!("{:#}", err),
        }
    }
}

/// Errors returned to the input surface.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChatError {
    #[error("backend index {index} is out of range (have {available})")]
    InvalidBackend { index: usize, available: usize },

    #[error("'{answer}' is not a choice between 1 and {max}")]
    InvalidChoice { answer: String, max: usize },

    #[error("failed to read {location}: {message}")]
    FileRead { location: String, message: String },
}
