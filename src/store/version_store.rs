//! Version store trait shared by every backend

use std::collections::BTreeMap;

#[cfg(test)]
use mockall::automock;

use crate::store::error::StoreError;
use crate::store::types::{UpdateMetadata, VersionEntry};
use crate::version::Version;

/// Trait for reading and writing tracked versions
///
/// Implementations must make `update_version` and `remove` atomic with
/// respect to other writers of the same document.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait VersionStore: Send + Sync {
    /// Short backend name used in logs
    fn backend_name(&self) -> &'static str;

    /// Get the full entry for a repository
    async fn get_entry(&self, owner: &str, repo: &str) -> Result<Option<VersionEntry>, StoreError>;

    /// Get the current version for a repository, if one was recorded
    async fn get_current_version(
        &self,
        owner: &str,
        repo: &str,
    ) -> Result<Option<Version>, StoreError> {
        Ok(self
            .get_entry(owner, repo)
            .await?
            .map(|entry| Version::parse(&entry.current_version)))
    }

    /// Record a downloaded version and append it to the history
    async fn update_version(
        &self,
        owner: &str,
        repo: &str,
        version: &str,
        metadata: UpdateMetadata,
    ) -> Result<(), StoreError>;

    /// Get every tracked repository keyed by `owner/repo`
    async fn list_all(&self) -> Result<BTreeMap<String, VersionEntry>, StoreError>;

    /// Forget a repository; returns whether it was tracked
    async fn remove(&self, owner: &str, repo: &str) -> Result<bool, StoreError>;
}
