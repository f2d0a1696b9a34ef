//! Object-store backed version database
//!
//! The whole database lives in a single remote document. Updates are
//! read-modify-write cycles; a transport that supports conditional writes
//! rejects a stale write with [`StoreError::Contention`] and the cycle is
//! retried against the fresh document.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::fetch::retry::{RetryPolicy, Sleeper, TokioSleeper, run_with_retry};
use crate::store::error::StoreError;
use crate::store::types::{UpdateMetadata, VersionDatabase, VersionEntry, repository_key};
use crate::store::version_store::VersionStore;

/// Read-modify-write attempts before contention is reported
pub const DEFAULT_WRITE_ATTEMPTS: u32 = 5;

const DEFAULT_WRITE_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDocument {
    pub body: Vec<u8>,
    /// Version token for conditional writes, when the backend provides one
    pub etag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    Unconditional,
    /// Only write if the document still carries this etag
    IfMatch(String),
    /// Only write if no document exists yet
    IfAbsent,
}

impl WriteCondition {
    fn for_document(document: Option<&RemoteDocument>) -> Self {
        match document {
            None => WriteCondition::IfAbsent,
            Some(RemoteDocument {
                etag: Some(etag), ..
            }) => WriteCondition::IfMatch(etag.clone()),
            Some(_) => WriteCondition::Unconditional,
        }
    }
}

/// Raw document access for a remote backend
#[async_trait::async_trait]
pub trait DocumentTransport: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Fetch the document; `None` when it does not exist yet
    async fn load(&self) -> Result<Option<RemoteDocument>, StoreError>;

    /// Upload the document. Transports without conditional writes may
    /// ignore `condition`.
    async fn save(&self, body: Vec<u8>, condition: WriteCondition) -> Result<(), StoreError>;
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, StoreError> {
    reqwest::Client::builder()
        .user_agent(concat!("release-tracker/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| StoreError::Unavailable(format!("cannot build HTTP client: {}", e)))
}

/// Map a non-success HTTP status to a store error
pub(crate) fn status_error(backend: &str, status: reqwest::StatusCode, url: &str) -> StoreError {
    match status {
        reqwest::StatusCode::PRECONDITION_FAILED | reqwest::StatusCode::CONFLICT => {
            StoreError::Contention(format!("{} rejected write to {} ({})", backend, url, status))
        }
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            StoreError::Unavailable(format!("{} denied access to {} ({})", backend, url, status))
        }
        _ => StoreError::Unavailable(format!("{} returned {} for {}", backend, status, url)),
    }
}

pub struct RemoteStore<T> {
    transport: T,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<T: DocumentTransport> RemoteStore<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            retry: RetryPolicy::new(DEFAULT_WRITE_ATTEMPTS, DEFAULT_WRITE_BACKOFF),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn parse(&self, document: Option<&RemoteDocument>) -> Result<VersionDatabase, StoreError> {
        match document {
            None => Ok(VersionDatabase::default()),
            Some(doc) if doc.body.iter().all(u8::is_ascii_whitespace) => {
                Ok(VersionDatabase::default())
            }
            Some(doc) => serde_json::from_slice(&doc.body).map_err(|e| {
                StoreError::Corrupt(format!("{} document: {}", self.transport.backend_name(), e))
            }),
        }
    }

    async fn read_database(&self) -> Result<VersionDatabase, StoreError> {
        let document = self.transport.load().await?;
        self.parse(document.as_ref())
    }

    async fn modify<R, F>(&self, label: &str, f: F) -> Result<R, StoreError>
    where
        F: Fn(&mut VersionDatabase) -> R + Send + Sync,
        R: Send,
    {
        let f = &f;
        let outcome = run_with_retry(&self.retry, self.sleeper.as_ref(), label, |_| async move {
            let document = self.transport.load().await?;
            let condition = WriteCondition::for_document(document.as_ref());
            let mut db = self.parse(document.as_ref())?;
            let out = f(&mut db);
            let body = serde_json::to_vec_pretty(&db)?;
            self.transport.save(body, condition).await?;
            Ok::<R, StoreError>(out)
        })
        .await;

        if outcome.result.is_ok() && outcome.attempts > 1 {
            debug!("{} succeeded after {} attempts", label, outcome.attempts);
        }
        outcome.result
    }
}

#[async_trait::async_trait]
impl<T: DocumentTransport> VersionStore for RemoteStore<T> {
    fn backend_name(&self) -> &'static str {
        self.transport.backend_name()
    }

    async fn get_entry(&self, owner: &str, repo: &str) -> Result<Option<VersionEntry>, StoreError> {
        let db = self.read_database().await?;
        Ok(db.entry(&repository_key(owner, repo)).cloned())
    }

    async fn update_version(
        &self,
        owner: &str,
        repo: &str,
        version: &str,
        metadata: UpdateMetadata,
    ) -> Result<(), StoreError> {
        let key = repository_key(owner, repo);
        let label = format!("{} store update of {}", self.backend_name(), key);
        // One timestamp for every attempt keeps a retried write identical
        let at = Utc::now();
        self.modify(&label, |db| db.record(&key, version, &metadata, at))
            .await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<BTreeMap<String, VersionEntry>, StoreError> {
        Ok(self.read_database().await?.repositories)
    }

    async fn remove(&self, owner: &str, repo: &str) -> Result<bool, StoreError> {
        let key = repository_key(owner, repo);
        let label = format!("{} store removal of {}", self.backend_name(), key);
        self.modify(&label, |db| db.remove(&key)).await
    }
}
