use thiserror::Error;

use crate::fetch::retry::{RetryClass, Retryable};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Lock wait timed out or a conditional write lost the race
    #[error("Store contention: {0}")]
    Contention(String),

    /// Backend could not be reached or refused access
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt version database: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Retryable for StoreError {
    fn retry_class(&self) -> RetryClass {
        match self {
            StoreError::Contention(_) => RetryClass::Transient { min_delay: None },
            _ => RetryClass::Terminal,
        }
    }
}
