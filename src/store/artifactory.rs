//! Artifactory generic-repository transport
//!
//! The document lives at `{base_url}/{repository}/{path}`. Artifactory has no
//! compare-and-swap for plain deploys, so writes are last-writer-wins; each PUT
//! carries `X-Checksum-Sha256` so the server can verify the upload.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::store::error::StoreError;
use crate::store::remote::{
    DocumentTransport, RemoteDocument, WriteCondition, http_client, status_error,
};

const CHECKSUM_HEADER: &str = "X-Checksum-Sha256";

#[derive(Clone, PartialEq, Eq)]
pub enum ArtifactoryAuth {
    Anonymous,
    /// Access token or API key sent as a bearer token
    Token(String),
    Basic { username: String, password: String },
}

impl std::fmt::Debug for ArtifactoryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactoryAuth::Anonymous => f.write_str("Anonymous"),
            ArtifactoryAuth::Token(_) => f.write_str("Token(***)"),
            ArtifactoryAuth::Basic { username, .. } => {
                write!(f, "Basic {{ username: {:?}, password: *** }}", username)
            }
        }
    }
}

impl ArtifactoryAuth {
    /// Token wins over username/password; incomplete basic credentials are ignored
    pub fn from_parts(
        token: Option<String>,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        let non_empty = |s: Option<String>| s.filter(|v| !v.is_empty());
        match (non_empty(token), non_empty(username), non_empty(password)) {
            (Some(token), _, _) => ArtifactoryAuth::Token(token),
            (None, Some(username), Some(password)) => ArtifactoryAuth::Basic { username, password },
            _ => ArtifactoryAuth::Anonymous,
        }
    }
}

pub struct ArtifactoryTransport {
    client: reqwest::Client,
    url: String,
    auth: ArtifactoryAuth,
}

impl ArtifactoryTransport {
    pub fn new(
        base_url: &str,
        repository: &str,
        path: &str,
        auth: ArtifactoryAuth,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let url = format!(
            "{}/{}/{}",
            base_url.trim_end_matches('/'),
            repository.trim_matches('/'),
            path.trim_start_matches('/')
        );
        reqwest::Url::parse(&url).map_err(|e| {
            StoreError::Unavailable(format!("invalid Artifactory URL '{}': {}", url, e))
        })?;

        Ok(Self {
            client: http_client(timeout)?,
            url,
            auth,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let request = self.client.request(method, &self.url);
        match &self.auth {
            ArtifactoryAuth::Anonymous => request,
            ArtifactoryAuth::Token(token) => request.bearer_auth(token),
            ArtifactoryAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        }
    }

    fn unreachable(&self, error: reqwest::Error) -> StoreError {
        StoreError::Unavailable(format!("artifactory request to {} failed: {}", self.url, error))
    }
}

#[async_trait::async_trait]
impl DocumentTransport for ArtifactoryTransport {
    fn backend_name(&self) -> &'static str {
        "artifactory"
    }

    async fn load(&self) -> Result<Option<RemoteDocument>, StoreError> {
        let response = self
            .request(reqwest::Method::GET)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("No version database at {}", self.url);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error("artifactory", status, &self.url));
        }

        let body = response.bytes().await.map_err(|e| self.unreachable(e))?;
        Ok(Some(RemoteDocument {
            body: body.to_vec(),
            etag: None,
        }))
    }

    async fn save(&self, body: Vec<u8>, _condition: WriteCondition) -> Result<(), StoreError> {
        let checksum = hex::encode(Sha256::digest(&body));
        let response = self
            .request(reqwest::Method::PUT)
            .header(CONTENT_TYPE, "application/json")
            .header(CHECKSUM_HEADER, checksum)
            .body(body)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if status.is_success() {
            debug!("Stored version database at {}", self.url);
            return Ok(());
        }
        Err(status_error("artifactory", status, &self.url))
    }
}
