//! Release source backed by a JSON export of release listings
//!
//! The file maps `owner/repo` to an array of releases, newest first:
//!
//! ```json
//! {
//!   "cli/cli": [
//!     {
//!       "tag_name": "v2.40.0",
//!       "published_at": "2024-01-15T00:00:00Z",
//!       "prerelease": false,
//!       "assets": [{ "name": "gh.tar.gz", "download_url": "https://...", "size": 100 }]
//!     }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::release::error::SourceError;
use crate::release::source::ReleaseSource;
use crate::release::types::{AssetRecord, ReleaseRecord, RepositoryId};

#[derive(Debug, Deserialize)]
struct ExportedRelease {
    tag_name: String,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    assets: Vec<AssetRecord>,
}

pub struct JsonFileReleaseSource {
    releases: HashMap<RepositoryId, Vec<ReleaseRecord>>,
}

impl JsonFileReleaseSource {
    /// Loads the export from disk
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SourceError::InvalidResponse(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, SourceError> {
        let exported: HashMap<String, Vec<ExportedRelease>> = serde_json::from_str(content)
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;

        let mut releases = HashMap::with_capacity(exported.len());
        for (key, records) in exported {
            let repository = key
                .parse::<RepositoryId>()
                .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;
            let records = records
                .into_iter()
                .map(|r| ReleaseRecord {
                    repository: repository.clone(),
                    tag_name: r.tag_name,
                    published_at: r.published_at,
                    prerelease: r.prerelease,
                    assets: r.assets,
                })
                .collect();
            releases.insert(repository, records);
        }

        debug!("Loaded release export for {} repositories", releases.len());
        Ok(Self { releases })
    }
}

#[async_trait::async_trait]
impl ReleaseSource for JsonFileReleaseSource {
    async fn list_releases(
        &self,
        owner: &str,
        repo: &str,
        include_prereleases: bool,
    ) -> Result<Vec<ReleaseRecord>, SourceError> {
        let id = RepositoryId::new(owner, repo);
        let records = self
            .releases
            .get(&id)
            .ok_or_else(|| SourceError::NotFound(id.key()))?;

        Ok(records
            .iter()
            .filter(|r| include_prereleases || !r.prerelease)
            .cloned()
            .collect())
    }
}
