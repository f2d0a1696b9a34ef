//! Release source test utilities

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use release_tracker::release::{
    AssetRecord, ReleaseRecord, ReleaseSource, RepositoryId, SourceError,
};

/// In-memory release source that counts list calls
#[derive(Default)]
pub struct FakeReleaseSource {
    releases: HashMap<String, Vec<ReleaseRecord>>,
    calls: AtomicUsize,
}

impl FakeReleaseSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases must be given newest first
    pub fn with_releases(mut self, owner: &str, repo: &str, releases: Vec<ReleaseRecord>) -> Self {
        self.releases.insert(format!("{}/{}", owner, repo), releases);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseSource for FakeReleaseSource {
    async fn list_releases(
        &self,
        owner: &str,
        repo: &str,
        include_prereleases: bool,
    ) -> Result<Vec<ReleaseRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = format!("{}/{}", owner, repo);
        let releases = self
            .releases
            .get(&key)
            .ok_or(SourceError::NotFound(key))?;
        Ok(releases
            .iter()
            .filter(|r| include_prereleases || !r.prerelease)
            .cloned()
            .collect())
    }
}

pub fn release(
    owner: &str,
    repo: &str,
    tag: &str,
    prerelease: bool,
    assets: Vec<AssetRecord>,
) -> ReleaseRecord {
    ReleaseRecord {
        repository: RepositoryId::new(owner, repo),
        tag_name: tag.to_string(),
        published_at: None,
        prerelease,
        assets,
    }
}

pub fn asset(name: &str, url: String, size: u64, digest: Option<&str>) -> AssetRecord {
    AssetRecord {
        name: name.to_string(),
        download_url: url,
        size,
        content_type: "application/octet-stream".to_string(),
        digest: digest.map(|d| format!("sha256:{}", d)),
    }
}
