//! Local JSON file backend
//!
//! Every operation takes an advisory lock on a sidecar `<file>.lock`
//! (shared for reads, exclusive for read-modify-write). Writes go to a
//! temporary file in the same directory and are renamed over the database,
//! so readers never observe a half-written document.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use fs2::FileExt;
use tracing::debug;

use crate::store::error::StoreError;
use crate::store::types::{UpdateMetadata, VersionDatabase, VersionEntry, repository_key};
use crate::store::version_store::VersionStore;

/// How long to wait for another process holding the lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

/// Releases the advisory lock when dropped
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

pub struct LocalFileStore {
    path: PathBuf,
    lock_timeout: Duration,
}

impl LocalFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&VersionDatabase) -> T + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        let timeout = self.lock_timeout;
        tokio::task::spawn_blocking(move || {
            let _guard = acquire_lock(&path, LockMode::Shared, timeout)?;
            let db = read_database(&path)?;
            Ok(f(&db))
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }

    async fn modify<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut VersionDatabase) -> T + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        let timeout = self.lock_timeout;
        tokio::task::spawn_blocking(move || {
            let _guard = acquire_lock(&path, LockMode::Exclusive, timeout)?;
            let mut db = read_database(&path)?;
            let out = f(&mut db);
            write_database(&path, &db)?;
            Ok(out)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "versions.json".into());
    name.push(".lock");
    path.with_file_name(name)
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
}

fn is_contended(error: &std::io::Error) -> bool {
    error.kind() == ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn acquire_lock(path: &Path, mode: LockMode, timeout: Duration) -> Result<LockGuard, StoreError> {
    std::fs::create_dir_all(parent_dir(path))?;
    let lock_file = lock_path(path);
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_file)?;

    let started = Instant::now();
    loop {
        // UFCS keeps these on fs2 rather than the std inherent methods
        let attempt = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };
        match attempt {
            Ok(()) => return Ok(LockGuard { file }),
            Err(e) if is_contended(&e) => {
                if started.elapsed() >= timeout {
                    return Err(StoreError::Contention(format!(
                        "timed out after {:?} waiting for {}",
                        timeout,
                        lock_file.display()
                    )));
                }
                std::thread::sleep(LOCK_POLL_INTERVAL);
            }
            Err(e) => return Err(StoreError::Io(e)),
        }
    }
}

/// A missing or empty file is an empty database
fn read_database(path: &Path) -> Result<VersionDatabase, StoreError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(VersionDatabase::default()),
        Err(e) => return Err(StoreError::Io(e)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(VersionDatabase::default());
    }
    serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))
}

fn write_database(path: &Path, db: &VersionDatabase) -> Result<(), StoreError> {
    let mut temp = tempfile::NamedTempFile::new_in(parent_dir(path))?;
    serde_json::to_writer_pretty(&mut temp, db)?;
    temp.write_all(b"\n")?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    debug!("Wrote version database {}", path.display());
    Ok(())
}

#[async_trait::async_trait]
impl VersionStore for LocalFileStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn get_entry(&self, owner: &str, repo: &str) -> Result<Option<VersionEntry>, StoreError> {
        let key = repository_key(owner, repo);
        self.read(move |db| db.entry(&key).cloned()).await
    }

    async fn update_version(
        &self,
        owner: &str,
        repo: &str,
        version: &str,
        metadata: UpdateMetadata,
    ) -> Result<(), StoreError> {
        let key = repository_key(owner, repo);
        let version = version.to_string();
        let changed = self
            .modify(move |db| db.record(&key, &version, &metadata, Utc::now()))
            .await?;
        if !changed {
            debug!(
                "Current version of {}/{} kept; update recorded in history only",
                owner, repo
            );
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<BTreeMap<String, VersionEntry>, StoreError> {
        self.read(|db| db.repositories.clone()).await
    }

    async fn remove(&self, owner: &str, repo: &str) -> Result<bool, StoreError> {
        let key = repository_key(owner, repo);
        self.modify(move |db| db.remove(&key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> LocalFileStore {
        LocalFileStore::new(dir.path().join("state").join("versions.json"))
    }

    fn meta(assets: &[&str]) -> UpdateMetadata {
        UpdateMetadata {
            assets: assets.iter().map(|a| a.to_string()).collect(),
            pinned: false,
        }
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        assert_eq!(store.get_current_version("cli", "cli").await.unwrap(), None);
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_then_get_returns_written_version() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store
            .update_version("cli", "cli", "v2.0.0", meta(&["gh.tar.gz"]))
            .await
            .unwrap();

        let current = store.get_current_version("cli", "cli").await.unwrap();
        assert_eq!(current.map(|v| v.raw().to_string()), Some("v2.0.0".to_string()));

        let entry = store.get_entry("cli", "cli").await.unwrap().unwrap();
        assert_eq!(entry.download_history.len(), 1);
        assert_eq!(entry.download_history[0].assets, vec!["gh.tar.gz".to_string()]);
    }

    #[tokio::test]
    async fn file_uses_repositories_layout() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .update_version("cli", "cli", "v2.0.0", meta(&[]))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["repositories"]["cli/cli"]["current_version"], "v2.0.0");
    }

    #[tokio::test]
    async fn remove_forgets_repository() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .update_version("cli", "cli", "v2.0.0", meta(&[]))
            .await
            .unwrap();

        assert!(store.remove("cli", "cli").await.unwrap());
        assert!(!store.remove("cli", "cli").await.unwrap());
        assert_eq!(store.get_entry("cli", "cli").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();

        let result = store.list_all().await;

        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }

    #[tokio::test]
    async fn empty_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "\n").unwrap();

        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn held_lock_times_out_with_contention() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).with_lock_timeout(Duration::from_millis(100));
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        let holder = File::create(lock_path(store.path())).unwrap();
        FileExt::lock_exclusive(&holder).unwrap();

        let result = store
            .update_version("cli", "cli", "v1.0.0", meta(&[]))
            .await;

        assert!(matches!(result, Err(StoreError::Contention(_))));
        FileExt::unlock(&holder).unwrap();
    }

    #[tokio::test]
    async fn concurrent_updates_are_all_persisted() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(store(&dir));

        let handles: Vec<_> = (0..10)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .update_version("owner", &format!("repo{}", i), "v1.0.0", meta(&[]))
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.list_all().await.unwrap().len(), 10);
    }
}
