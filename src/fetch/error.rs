use thiserror::Error;

use crate::fetch::retry::{RetryClass, Retryable};

#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeouts, connection resets and 5xx responses
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// 4xx responses and malformed URLs
    #[error("Request failed: {0}")]
    TerminalRequest(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Truncated or oversized body
    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Retryable for FetchError {
    fn retry_class(&self) -> RetryClass {
        match self {
            FetchError::TransientNetwork(_) | FetchError::SizeMismatch { .. } => {
                RetryClass::Transient { min_delay: None }
            }
            FetchError::ChecksumMismatch { .. } => RetryClass::RetryOnce,
            FetchError::TerminalRequest(_) | FetchError::Io(_) => RetryClass::Terminal,
        }
    }
}

impl FetchError {
    /// Classify a reqwest transport error
    pub(crate) fn from_transport(error: reqwest::Error) -> Self {
        if error.is_builder() {
            FetchError::TerminalRequest(error.to_string())
        } else {
            FetchError::TransientNetwork(error.to_string())
        }
    }
}
