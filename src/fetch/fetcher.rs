//! Fetcher trait for downloading a single release asset

use std::path::PathBuf;

#[cfg(test)]
use mockall::automock;
use serde::Serialize;

use crate::fetch::error::FetchError;

/// What to download and how to verify it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Final path of the file; a temporary sibling is used while streaming
    pub destination: PathBuf,
    pub expected_size: Option<u64>,
    /// Lowercase hex SHA-256 the content must match
    pub expected_sha256: Option<String>,
}

/// A verified file on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchResult {
    pub path: PathBuf,
    pub size: u64,
    /// SHA-256 of the streamed bytes, always computed for audit
    pub sha256: String,
    /// Whether `sha256` was checked against an expected digest
    pub checksum_verified: bool,
    pub attempts: u32,
}

/// Trait for fetching release assets to disk
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Downloads `request.url` to `request.destination`
    ///
    /// The destination only appears once the content passed verification.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, FetchError>;
}
