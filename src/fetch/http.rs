//! HTTP fetch engine
//!
//! Streams a response body to a temporary file next to the destination,
//! hashing as it goes, and renames the file into place only after the size
//! and checksum checks pass.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::fetch::error::FetchError;
use crate::fetch::fetcher::{AssetFetcher, FetchRequest, FetchResult};
use crate::fetch::retry::{RetryPolicy, Sleeper, TokioSleeper, run_with_retry};

const USER_AGENT: &str = concat!("release-tracker/", env!("CARGO_PKG_VERSION"));

pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

/// Verified content of one attempt, before the attempt count is known
struct Streamed {
    size: u64,
    sha256: String,
    checksum_verified: bool,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| FetchError::TerminalRequest(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the backoff sleeper (tests use `NoSleep`)
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<Streamed, FetchError> {
        let url = reqwest::Url::parse(&request.url).map_err(|e| {
            FetchError::TerminalRequest(format!("invalid URL '{}': {}", request.url, e))
        })?;

        let directory = request
            .destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let file_name = request
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                FetchError::TerminalRequest(format!(
                    "destination has no file name: {}",
                    request.destination.display()
                ))
            })?;
        tokio::fs::create_dir_all(directory).await?;

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_transport)?;

        let status = response.status();
        if status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
        {
            return Err(FetchError::TransientNetwork(format!(
                "HTTP {} for {}",
                status, request.url
            )));
        }
        if !status.is_success() {
            return Err(FetchError::TerminalRequest(format!(
                "HTTP {} for {}",
                status, request.url
            )));
        }

        // Dropping `temp_path` on any early return removes the partial file
        let (std_file, temp_path) = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".part")
            .tempfile_in(directory)?
            .into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut hasher = Sha256::new();
        let mut size: u64 = 0;
        while let Some(chunk) = response.chunk().await.map_err(FetchError::from_transport)? {
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let sha256 = hex::encode(hasher.finalize());

        if let Some(expected) = request.expected_size
            && expected != size
        {
            return Err(FetchError::SizeMismatch {
                expected,
                actual: size,
            });
        }

        let checksum_verified = match &request.expected_sha256 {
            Some(expected) if !expected.eq_ignore_ascii_case(&sha256) => {
                return Err(FetchError::ChecksumMismatch {
                    expected: expected.clone(),
                    actual: sha256,
                });
            }
            Some(_) => true,
            None => false,
        };

        temp_path
            .persist(&request.destination)
            .map_err(|e| FetchError::Io(e.error))?;

        Ok(Streamed {
            size,
            sha256,
            checksum_verified,
        })
    }
}

#[async_trait::async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult, FetchError> {
        debug!(
            "Fetching {} -> {}",
            request.url,
            request.destination.display()
        );

        let label = format!("download of {}", request.url);
        let outcome = run_with_retry(&self.retry, self.sleeper.as_ref(), &label, |_| {
            self.attempt(request)
        })
        .await;

        let streamed = outcome.result?;
        info!(
            "Downloaded {} ({} bytes, sha256 {}) in {} attempt(s)",
            request.destination.display(),
            streamed.size,
            streamed.sha256,
            outcome.attempts
        );

        Ok(FetchResult {
            path: request.destination.clone(),
            size: streamed.size,
            sha256: streamed.sha256,
            checksum_verified: streamed.checksum_verified,
            attempts: outcome.attempts,
        })
    }
}
