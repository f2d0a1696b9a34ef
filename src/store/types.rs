//! Persisted version database layout
//!
//! ```json
//! {
//!   "repositories": {
//!     "owner/repo": {
//!       "current_version": "v2.0.0",
//!       "last_updated": "2024-01-15T00:00:00Z",
//!       "download_history": [
//!         {"version": "v2.0.0", "downloaded_at": "2024-01-15T00:00:00Z", "assets": ["tool.tar.gz"]}
//!       ]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::version::{Version, is_newer};

/// Build the store key for a repository
pub fn repository_key(owner: &str, repo: &str) -> String {
    format!("{}/{}", owner, repo)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDatabase {
    #[serde(default)]
    pub repositories: BTreeMap<String, VersionEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub current_version: String,
    pub last_updated: DateTime<Utc>,
    /// Append-only; never truncated by a store
    #[serde(default)]
    pub download_history: Vec<DownloadRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub version: String,
    pub downloaded_at: DateTime<Utc>,
    #[serde(default)]
    pub assets: Vec<String>,
}

/// Extra information written alongside a version update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateMetadata {
    /// Names of the assets retrieved for this version
    pub assets: Vec<String>,
    /// Set when the version was forced by a pin; bypasses the newer-only rule
    pub pinned: bool,
}

impl VersionEntry {
    fn new(version: &str, metadata: &UpdateMetadata, at: DateTime<Utc>) -> Self {
        Self {
            current_version: version.to_string(),
            last_updated: at,
            download_history: vec![DownloadRecord {
                version: version.to_string(),
                downloaded_at: at,
                assets: metadata.assets.clone(),
            }],
        }
    }

    /// Record a completed download.
    ///
    /// `current_version` only moves to a strictly newer version unless the
    /// update is pinned. The history entry is appended either way.
    /// Returns whether `current_version` changed.
    fn apply(&mut self, version: &str, metadata: &UpdateMetadata, at: DateTime<Utc>) -> bool {
        let replace = metadata.pinned
            || is_newer(
                &Version::parse(version),
                Some(&Version::parse(&self.current_version)),
            );
        if replace {
            self.current_version = version.to_string();
            self.last_updated = at;
        }
        self.download_history.push(DownloadRecord {
            version: version.to_string(),
            downloaded_at: at,
            assets: metadata.assets.clone(),
        });
        replace
    }
}

impl VersionDatabase {
    pub fn entry(&self, key: &str) -> Option<&VersionEntry> {
        self.repositories.get(key)
    }

    /// Apply an update for `key`; returns whether the current version changed
    pub fn record(
        &mut self,
        key: &str,
        version: &str,
        metadata: &UpdateMetadata,
        at: DateTime<Utc>,
    ) -> bool {
        match self.repositories.get_mut(key) {
            Some(entry) => entry.apply(version, metadata, at),
            None => {
                self.repositories
                    .insert(key.to_string(), VersionEntry::new(version, metadata, at));
                true
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.repositories.remove(key).is_some()
    }
}
