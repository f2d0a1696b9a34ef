//! Persistent record of the last downloaded version per repository
//!
//! # Modules
//!
//! - [`version_store`]: the `VersionStore` trait the coordinator talks to
//! - [`types`]: database document, entries and download history
//! - [`local`]: JSON file on local disk guarded by an advisory lock
//! - [`remote`]: read-modify-write store over a single remote document
//! - [`s3`]: S3-compatible transport with conditional writes
//! - [`artifactory`]: Artifactory generic-repository transport
//! - [`error`]: store error taxonomy

pub mod artifactory;
pub mod error;
pub mod local;
pub mod remote;
pub mod s3;
pub mod types;
pub mod version_store;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

pub use artifactory::{ArtifactoryAuth, ArtifactoryTransport};
pub use error::StoreError;
pub use local::LocalFileStore;
pub use remote::{DocumentTransport, RemoteDocument, RemoteStore, WriteCondition};
pub use s3::S3Transport;
pub use types::{DownloadRecord, UpdateMetadata, VersionDatabase, VersionEntry, repository_key};
pub use version_store::VersionStore;

use crate::config::{StorageConfig, default_store_path};

/// Build the store selected by configuration
pub fn open(
    storage: &StorageConfig,
    timeout: Duration,
) -> Result<Arc<dyn VersionStore>, StoreError> {
    let store: Arc<dyn VersionStore> = match storage {
        StorageConfig::Local { path } => {
            let path = path.clone().unwrap_or_else(default_store_path);
            info!("Using local version store at {}", path.display());
            Arc::new(LocalFileStore::new(path))
        }
        StorageConfig::S3 {
            endpoint,
            bucket,
            key,
            bearer_token,
            conditional_writes,
        } => {
            let transport = S3Transport::new(
                endpoint,
                bucket,
                key,
                bearer_token.clone(),
                *conditional_writes,
                timeout,
            )?;
            info!("Using S3 version store at {}", transport.object_url());
            Arc::new(RemoteStore::new(transport))
        }
        StorageConfig::Artifactory {
            base_url,
            repository,
            path,
            token,
            username,
            password,
        } => {
            let auth =
                ArtifactoryAuth::from_parts(token.clone(), username.clone(), password.clone());
            let transport = ArtifactoryTransport::new(base_url, repository, path, auth, timeout)?;
            info!("Using Artifactory version store at {}", transport.url());
            Arc::new(RemoteStore::new(transport))
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_selects_backend_from_configuration() {
        let dir = TempDir::new().unwrap();
        let timeout = Duration::from_secs(5);

        let local = open(
            &StorageConfig::Local {
                path: Some(dir.path().join("versions.json")),
            },
            timeout,
        )
        .unwrap();
        let s3 = open(
            &StorageConfig::S3 {
                endpoint: "https://s3.example.com".to_string(),
                bucket: "releases".to_string(),
                key: "versions.json".to_string(),
                bearer_token: None,
                conditional_writes: true,
            },
            timeout,
        )
        .unwrap();
        let artifactory = open(
            &StorageConfig::Artifactory {
                base_url: "https://example.jfrog.io/artifactory".to_string(),
                repository: "generic-local".to_string(),
                path: "versions.json".to_string(),
                token: None,
                username: None,
                password: None,
            },
            timeout,
        )
        .unwrap();

        assert_eq!(local.backend_name(), "local");
        assert_eq!(s3.backend_name(), "s3");
        assert_eq!(artifactory.backend_name(), "artifactory");
    }

    #[test]
    fn open_rejects_unparseable_endpoint() {
        let result = open(
            &StorageConfig::S3 {
                endpoint: "not a url".to_string(),
                bucket: "releases".to_string(),
                key: "versions.json".to_string(),
                bearer_token: None,
                conditional_writes: true,
            },
            Duration::from_secs(5),
        );

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
