//! Release source trait for listing releases of a repository

#[cfg(test)]
use mockall::automock;

use crate::release::error::SourceError;
use crate::release::types::ReleaseRecord;

/// Trait for listing releases from an upstream release API
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Lists releases for a repository
    ///
    /// # Arguments
    /// * `owner` - Repository owner (e.g., "kubernetes")
    /// * `repo` - Repository name (e.g., "kubectl")
    /// * `include_prereleases` - Whether prerelease records may be returned
    ///
    /// # Returns
    /// * `Ok(Vec<ReleaseRecord>)` - Releases ordered from newest to oldest
    /// * `Err(SourceError)` - Rate limiting, missing repository or transport failure
    async fn list_releases(
        &self,
        owner: &str,
        repo: &str,
        include_prereleases: bool,
    ) -> Result<Vec<ReleaseRecord>, SourceError>;
}
