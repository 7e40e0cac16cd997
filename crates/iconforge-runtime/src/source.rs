//! Where the runtime fetches manifests and sprites from

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use iconforge_core::{Manifest, ManifestError, PipelineConfig, TagManifest};

/// Fetch failure; the resolvers degrade instead of propagating it
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("invalid tag manifest: {0}")]
    Tags(#[source] serde_json::Error),

    /// No answer within the fetch timeout
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// Backend-specific failure (non-HTTP sources)
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Default bound on a single fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `fetch`, giving up after `limit`
pub(crate) async fn bounded<T, F>(limit: Duration, fetch: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    tokio::time::timeout(limit, fetch)
        .await
        .unwrap_or(Err(FetchError::Timeout(limit)))
}

/// Remote assets the runtime depends on
#[async_trait]
pub trait AssetSource: Send + Sync + Debug {
    /// The current icon manifest
    async fn fetch_manifest(&self) -> Result<Manifest, FetchError>;

    /// A sprite by public URL
    async fn fetch_bundle(&self, url: &str) -> Result<Bytes, FetchError>;

    /// The dynamic tag manifest
    async fn fetch_tags(&self) -> Result<TagManifest, FetchError>;
}

/// HTTP source for the published endpoints
#[derive(Debug, Clone)]
pub struct HttpAssetSource {
    client: reqwest::Client,
    manifest_url: String,
    tags_url: String,
}

impl HttpAssetSource {
    /// Source whose requests give up after `timeout`
    ///
    /// # Errors
    /// Returns [`FetchError::Transport`] if the HTTP client cannot be built
    pub fn new(
        manifest_url: impl Into<String>,
        tags_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            manifest_url: manifest_url.into(),
            tags_url: tags_url.into(),
        })
    }

    /// Source for the configured manifest and tag endpoints
    ///
    /// # Errors
    /// See [`HttpAssetSource::new`]
    pub fn from_config(config: &PipelineConfig) -> Result<Self, FetchError> {
        Self::new(
            config.manifest_url(),
            config.runtime.tags_url.clone(),
            config.runtime.fetch_timeout(),
        )
    }

    #[inline]
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl AssetSource for HttpAssetSource {
    async fn fetch_manifest(&self) -> Result<Manifest, FetchError> {
        let body = self.get(&self.manifest_url).await?;
        Ok(Manifest::from_json(&body)?)
    }

    async fn fetch_bundle(&self, url: &str) -> Result<Bytes, FetchError> {
        self.get(url).await
    }

    async fn fetch_tags(&self) -> Result<TagManifest, FetchError> {
        let body = self.get(&self.tags_url).await?;
        serde_json::from_slice(&body).map_err(FetchError::Tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bounded_passes_answers_through_and_cuts_off_silence() {
        let answered = bounded(Duration::from_secs(1), async { Ok::<_, FetchError>(7) }).await;
        assert_eq!(answered.unwrap(), 7);

        let silent = bounded(Duration::from_secs(1), std::future::pending::<Result<u8, FetchError>>());
        assert!(matches!(silent.await, Err(FetchError::Timeout(limit)) if limit == Duration::from_secs(1)));
    }

    #[test]
    fn client_builds_from_default_config() {
        let source = HttpAssetSource::from_config(&PipelineConfig::default()).unwrap();
        assert!(source.manifest_url.ends_with("/manifest.json"));
    }
}
