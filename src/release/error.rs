use std::time::Duration;

use thiserror::Error;

use crate::fetch::retry::{RetryClass, Retryable};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Repository not found: {0}")]
    NotFound(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl Retryable for SourceError {
    fn retry_class(&self) -> RetryClass {
        match self {
            SourceError::RateLimited { retry_after_secs } => RetryClass::Transient {
                min_delay: retry_after_secs.map(Duration::from_secs),
            },
            SourceError::Network(_) => RetryClass::Transient { min_delay: None },
            SourceError::NotFound(_) | SourceError::InvalidResponse(_) => RetryClass::Terminal,
        }
    }
}
