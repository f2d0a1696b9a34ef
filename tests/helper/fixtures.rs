//! Coordinator and store fixtures

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tempfile::TempDir;

use release_tracker::coordinator::{CoordinatorOptions, ReleaseCoordinator};
use release_tracker::fetch::{HttpFetcher, NoSleep, RetryPolicy};
use release_tracker::release::ReleaseSource;
use release_tracker::store::{LocalFileStore, VersionStore};

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Options for tests: no throttling, fast retries, downloads under `dir`
pub fn test_options(dir: &TempDir) -> CoordinatorOptions {
    CoordinatorOptions {
        rate_limit_delay: Duration::ZERO,
        download_directory: dir.path().join("downloads"),
        retry: RetryPolicy::new(3, Duration::from_millis(1)),
        ..CoordinatorOptions::default()
    }
}

pub fn create_test_store(dir: &TempDir) -> Arc<LocalFileStore> {
    Arc::new(LocalFileStore::new(dir.path().join("state").join("versions.json")))
}

/// Coordinator with a real HTTP fetcher that never sleeps between retries
pub fn create_test_coordinator(
    options: CoordinatorOptions,
    source: Arc<dyn ReleaseSource>,
    store: Arc<dyn VersionStore>,
) -> ReleaseCoordinator {
    let fetcher = HttpFetcher::new(Duration::from_secs(5), options.retry.clone())
        .unwrap()
        .with_sleeper(Arc::new(NoSleep));
    ReleaseCoordinator::new(options, source, store, Arc::new(fetcher))
        .unwrap()
        .with_sleeper(Arc::new(NoSleep))
}

pub fn read_file(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap_or_else(|e| panic!("cannot read {}: {}", path.display(), e))
}
