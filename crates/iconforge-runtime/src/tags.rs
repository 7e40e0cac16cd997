//! Dynamic tag resolution
//!
//! Content-managed imagery is looked up by tag in a manifest maintained
//! outside the pipeline. The manifest is cached for a bounded freshness
//! window; when the endpoint is down or does not answer within the fetch
//! timeout the empty mapping is cached instead, so callers fall back to
//! placeholders without hammering the endpoint.

use std::sync::Arc;
use std::time::Duration;

use iconforge_core::{RuntimeConfig, TagManifest};
use moka::future::Cache;

use crate::source::{bounded, AssetSource, DEFAULT_FETCH_TIMEOUT};

/// Tag-to-URL resolver with a TTL cache
#[derive(Debug, Clone)]
pub struct DynamicTagResolver {
    source: Arc<dyn AssetSource>,
    cache: Cache<(), Arc<TagManifest>>,
    fetch_timeout: Duration,
}

impl DynamicTagResolver {
    /// Resolver caching the tag manifest for `ttl`
    #[must_use]
    pub fn new(source: Arc<dyn AssetSource>, ttl: Duration) -> Self {
        Self {
            source,
            cache: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Resolver using the configured freshness window
    #[must_use]
    pub fn from_config(source: Arc<dyn AssetSource>, config: &RuntimeConfig) -> Self {
        Self::new(source, config.tags_ttl()).with_fetch_timeout(config.fetch_timeout())
    }

    /// The cached mapping, fetching it if stale
    ///
    /// Concurrent callers share a single fetch.
    pub async fn mapping(&self) -> Arc<TagManifest> {
        self.cache
            .get_with((), async {
                match bounded(self.fetch_timeout, self.source.fetch_tags()).await {
                    Ok(tags) => {
                        tracing::debug!(version = %tags.version, categories = tags.categories.len(), "tag manifest loaded");
                        Arc::new(tags)
                    }
                    Err(error) => {
                        tracing::warn!(%error, "tag manifest unavailable, using empty mapping");
                        Arc::new(TagManifest::default())
                    }
                }
            })
            .await
    }

    /// URL for the first of `tags` present in `category`
    pub async fn resolve<S: AsRef<str>>(&self, category: &str, tags: &[S]) -> Option<String> {
        self.mapping()
            .await
            .lookup(category, tags)
            .map(str::to_string)
    }

    /// Drop the cached mapping and fetch a fresh one
    pub async fn refresh(&self) -> Arc<TagManifest> {
        self.cache.invalidate(&()).await;
        self.mapping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use iconforge_core::Manifest;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::source::FetchError;

    #[derive(Debug, Default)]
    struct TagSource {
        fail_first: bool,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl AssetSource for TagSource {
        async fn fetch_manifest(&self) -> Result<Manifest, FetchError> {
            Err(FetchError::Unavailable("unused".into()))
        }

        async fn fetch_bundle(&self, _url: &str) -> Result<Bytes, FetchError> {
            Err(FetchError::Unavailable("unused".into()))
        }

        async fn fetch_tags(&self) -> Result<TagManifest, FetchError> {
            if self.fetches.fetch_add(1, Ordering::SeqCst) == 0 && self.fail_first {
                return Err(FetchError::Unavailable("503".into()));
            }
            let mut hero = BTreeMap::new();
            hero.insert("black-friday".to_string(), "https://cdn.example.com/bf.webp".to_string());
            hero.insert("default".to_string(), "https://cdn.example.com/hero.webp".to_string());
            Ok(TagManifest {
                version: "42".into(),
                last_update: None,
                categories: [("hero".to_string(), hero)].into_iter().collect(),
            })
        }
    }

    fn resolver(source: Arc<TagSource>) -> DynamicTagResolver {
        DynamicTagResolver::new(source, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn first_present_tag_wins() {
        let resolver = resolver(Arc::new(TagSource::default()));
        assert_eq!(
            resolver.resolve("hero", &["cyber-monday", "black-friday", "default"]).await,
            Some("https://cdn.example.com/bf.webp".to_string())
        );
        assert_eq!(resolver.resolve("hero", &["unknown"]).await, None);
        assert_eq!(resolver.resolve("footer", &["default"]).await, None);
    }

    #[tokio::test]
    async fn mapping_is_cached_within_ttl() {
        let source = Arc::new(TagSource::default());
        let resolver = resolver(source.clone());
        let _ = resolver.resolve("hero", &["default"]).await;
        let _ = resolver.resolve("hero", &["default"]).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_degrades_until_refresh() {
        let source = Arc::new(TagSource {
            fail_first: true,
            ..TagSource::default()
        });
        let resolver = resolver(source.clone());

        assert_eq!(resolver.resolve("hero", &["default"]).await, None);
        assert!(resolver.mapping().await.is_empty());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        let fresh = resolver.refresh().await;
        assert_eq!(fresh.version, "42");
        assert!(resolver.resolve("hero", &["default"]).await.is_some());
    }

    #[derive(Debug)]
    struct HangingTags;

    #[async_trait]
    impl AssetSource for HangingTags {
        async fn fetch_manifest(&self) -> Result<Manifest, FetchError> {
            Err(FetchError::Unavailable("unused".into()))
        }

        async fn fetch_bundle(&self, _url: &str) -> Result<Bytes, FetchError> {
            Err(FetchError::Unavailable("unused".into()))
        }

        async fn fetch_tags(&self) -> Result<TagManifest, FetchError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_endpoint_falls_back_to_empty_mapping() {
        let config = RuntimeConfig {
            fetch_timeout_secs: 3,
            ..RuntimeConfig::default()
        };
        let tags = DynamicTagResolver::from_config(Arc::new(HangingTags), &config);

        let lookup = tokio::time::timeout(Duration::from_secs(10), tags.resolve("hero", &["default"]));
        assert_eq!(lookup.await.unwrap(), None);
        assert!(tags.mapping().await.categories.is_empty());
    }
}
