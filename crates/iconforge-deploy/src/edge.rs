//! Edge cache invalidation
//!
//! Invalidation is best-effort: callers log a failure and move on. Requests
//! only ever list concrete paths.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

/// Invalidation failure
#[derive(Debug, thiserror::Error)]
pub enum InvalidationError {
    /// Request never reached the endpoint
    #[error("invalidation request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("invalidation rejected with HTTP {status}")]
    Status { status: u16 },

    /// Caller tried to purge a wildcard
    #[error("refusing wildcard invalidation path: {0}")]
    Wildcard(String),

    /// Endpoint did not answer in time
    #[error("invalidation not acknowledged within {0:?}")]
    Timeout(Duration),
}

/// Edge cache in front of the object store
#[async_trait]
pub trait EdgeCache: Send + Sync + Debug {
    /// Invalidate the given absolute paths
    async fn invalidate(&self, paths: &[String]) -> Result<(), InvalidationError>;
}

pub(crate) fn check_paths(paths: &[String]) -> Result<(), InvalidationError> {
    match paths.iter().find(|p| p.contains('*')) {
        Some(path) => Err(InvalidationError::Wildcard(path.clone())),
        None => Ok(()),
    }
}

/// Edge cache that does nothing (no CDN configured)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEdgeCache;

#[async_trait]
impl EdgeCache for NoopEdgeCache {
    async fn invalidate(&self, paths: &[String]) -> Result<(), InvalidationError> {
        check_paths(paths)?;
        tracing::debug!(paths = paths.len(), "no edge cache configured, skipping invalidation");
        Ok(())
    }
}

#[derive(Serialize)]
struct PurgeRequest<'a> {
    paths: &'a [String],
}

/// Purge client for an HTTP endpoint accepting `{"paths": [...]}`
#[derive(Debug, Clone)]
pub struct HttpPurgeClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPurgeClient {
    /// Client posting to `endpoint`, giving up on a request after `timeout`
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, InvalidationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoint))
    }

    /// Client reusing an existing connection pool
    #[must_use]
    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl EdgeCache for HttpPurgeClient {
    async fn invalidate(&self, paths: &[String]) -> Result<(), InvalidationError> {
        check_paths(paths)?;
        let response = self
            .client
            .post(&self.endpoint)
            .json(&PurgeRequest { paths })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(InvalidationError::Status {
                status: status.as_u16(),
            });
        }
        tracing::info!(paths = paths.len(), endpoint = %self.endpoint, "submitted invalidation");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_accepts_concrete_paths() {
        let paths = vec!["/manifest.json".to_string(), "/sprite-core-1a2b3c4d.svg".to_string()];
        assert!(NoopEdgeCache.invalidate(&paths).await.is_ok());
    }

    #[tokio::test]
    async fn wildcard_is_refused() {
        let paths = vec!["/*".to_string()];
        assert!(matches!(
            NoopEdgeCache.invalidate(&paths).await,
            Err(InvalidationError::Wildcard(_))
        ));
    }

    #[test]
    fn purge_body_shape() {
        let paths = vec!["/manifest.json".to_string()];
        let body = serde_json::to_value(PurgeRequest { paths: &paths }).unwrap();
        assert_eq!(body, serde_json::json!({ "paths": ["/manifest.json"] }));
    }
}
