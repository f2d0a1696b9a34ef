//! S3-compatible object transport
//!
//! Path-style addressing: `{endpoint}/{bucket}/{key}`. Requests carry an
//! optional bearer token. Conditional writes use `If-Match` with the etag of
//! the document that was read, or `If-None-Match: *` for the first write.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH};
use tracing::debug;

use crate::store::error::StoreError;
use crate::store::remote::{
    DocumentTransport, RemoteDocument, WriteCondition, http_client, status_error,
};

pub struct S3Transport {
    client: reqwest::Client,
    object_url: String,
    bearer_token: Option<String>,
    conditional_writes: bool,
}

impl S3Transport {
    pub fn new(
        endpoint: &str,
        bucket: &str,
        key: &str,
        bearer_token: Option<String>,
        conditional_writes: bool,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let object_url = format!(
            "{}/{}/{}",
            endpoint.trim_end_matches('/'),
            bucket.trim_matches('/'),
            key.trim_start_matches('/')
        );
        reqwest::Url::parse(&object_url).map_err(|e| {
            StoreError::Unavailable(format!("invalid S3 URL '{}': {}", object_url, e))
        })?;

        Ok(Self {
            client: http_client(timeout)?,
            object_url,
            bearer_token: bearer_token.filter(|t| !t.is_empty()),
            conditional_writes,
        })
    }

    pub fn object_url(&self) -> &str {
        &self.object_url
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let request = self.client.request(method, &self.object_url);
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn unreachable(&self, error: reqwest::Error) -> StoreError {
        StoreError::Unavailable(format!("s3 request to {} failed: {}", self.object_url, error))
    }
}

#[async_trait::async_trait]
impl DocumentTransport for S3Transport {
    fn backend_name(&self) -> &'static str {
        "s3"
    }

    async fn load(&self) -> Result<Option<RemoteDocument>, StoreError> {
        let response = self
            .request(reqwest::Method::GET)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("No version database at {}", self.object_url);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error("s3", status, &self.object_url));
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response.bytes().await.map_err(|e| self.unreachable(e))?;

        Ok(Some(RemoteDocument {
            body: body.to_vec(),
            etag,
        }))
    }

    async fn save(&self, body: Vec<u8>, condition: WriteCondition) -> Result<(), StoreError> {
        let mut request = self
            .request(reqwest::Method::PUT)
            .header(CONTENT_TYPE, "application/json");
        if self.conditional_writes {
            request = match &condition {
                WriteCondition::IfMatch(etag) => request.header(IF_MATCH, etag.as_str()),
                WriteCondition::IfAbsent => request.header(IF_NONE_MATCH, "*"),
                WriteCondition::Unconditional => request,
            };
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        let status = response.status();
        if status.is_success() {
            debug!("Stored version database at {}", self.object_url);
            return Ok(());
        }
        Err(status_error("s3", status, &self.object_url))
    }
}
