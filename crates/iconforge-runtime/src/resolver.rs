//! Runtime icon resolution
//!
//! The manifest is fetched at most once per resolver. Concurrent callers that
//! arrive while the fetch is in flight wait on the same fetch, which is bounded
//! by the fetch timeout. A failed or timed-out fetch is remembered as "no
//! manifest": every lookup then yields [`Resolution::NotFound`] and the
//! application renders its placeholder.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use iconforge_core::{symbol_id, CdnConfig, CriticalIconRegistry, Manifest};
use tokio::sync::OnceCell;

use crate::loaded::LoadedSections;
use crate::source::{bounded, AssetSource, DEFAULT_FETCH_TIMEOUT};

/// Resolver contract violations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// Critical icons are embedded inline and never resolved at runtime
    #[error("`{name}` is a critical icon; embed it inline instead of resolving it")]
    CriticalIcon { name: String },
}

/// Reference to a symbol inside a published sprite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteRef {
    pub section: String,
    pub name: String,
    pub bundle_url: String,
    pub symbol_id: String,
}

impl SpriteRef {
    /// `{bundle_url}#icon-{name}`, usable as a `<use href>`
    #[must_use]
    pub fn href(&self) -> String {
        format!("{}#{}", self.bundle_url, self.symbol_id)
    }
}

impl Display for SpriteRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.bundle_url, self.symbol_id)
    }
}

/// Lookup result; a miss is not an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Sprite(SpriteRef),
    NotFound,
}

/// Resolves `(section, name)` pairs against the published manifest
#[derive(Debug)]
pub struct RuntimeIconResolver {
    source: Arc<dyn AssetSource>,
    registry: CriticalIconRegistry,
    cdn: CdnConfig,
    loaded: Arc<LoadedSections>,
    manifest: OnceCell<Option<Arc<Manifest>>>,
    prefetch: bool,
    fetch_timeout: Duration,
}

impl RuntimeIconResolver {
    #[must_use]
    pub fn new(
        source: Arc<dyn AssetSource>,
        registry: CriticalIconRegistry,
        cdn: CdnConfig,
        loaded: Arc<LoadedSections>,
    ) -> Self {
        Self {
            source,
            registry,
            cdn,
            loaded,
            manifest: OnceCell::new(),
            prefetch: true,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Bound on the manifest and sprite fetches; a timeout counts as a failure
    #[inline]
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Whether a hit also prefetches its section's sprite (default on)
    #[inline]
    #[must_use]
    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Whether the one-time manifest fetch has completed
    #[must_use]
    pub fn is_manifest_loaded(&self) -> bool {
        self.manifest.initialized()
    }

    /// The manifest, fetching it on first use
    pub async fn manifest(&self) -> Option<Arc<Manifest>> {
        self.manifest
            .get_or_init(|| async {
                match bounded(self.fetch_timeout, self.source.fetch_manifest()).await {
                    Ok(manifest) => {
                        tracing::debug!(version = %manifest.version, sections = manifest.sections.len(), "icon manifest loaded");
                        Some(Arc::new(manifest))
                    }
                    Err(error) => {
                        tracing::warn!(%error, "icon manifest unavailable, sprite icons will render placeholders");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Resolve a non-critical icon
    ///
    /// # Errors
    /// Returns [`ResolveError::CriticalIcon`] if `name` is in the critical
    /// registry, whatever the section.
    pub async fn resolve(&self, section: &str, name: &str) -> Result<Resolution, ResolveError> {
        if self.registry.contains(name) {
            return Err(ResolveError::CriticalIcon {
                name: name.to_string(),
            });
        }

        let Some(manifest) = self.manifest().await else {
            return Ok(Resolution::NotFound);
        };
        let Some(entry) = manifest.entry(section).filter(|entry| entry.contains(name)) else {
            tracing::debug!(section, name, "icon not in manifest");
            return Ok(Resolution::NotFound);
        };

        let sprite = SpriteRef {
            section: section.to_string(),
            name: name.to_string(),
            bundle_url: self.cdn.url_for(&entry.file_name),
            symbol_id: symbol_id(name),
        };
        if self.prefetch {
            self.prefetch_url(section, &sprite.bundle_url).await;
        }
        Ok(Resolution::Sprite(sprite))
    }

    /// Fetch a section's sprite unless this session already tried
    ///
    /// Returns `true` if this call performed the fetch successfully. A failed
    /// fetch is not retried until [`LoadedSections::clear`].
    pub async fn prefetch_section(&self, section: &str) -> bool {
        let Some(manifest) = self.manifest().await else {
            return false;
        };
        let Some(entry) = manifest.entry(section) else {
            return false;
        };
        let url = self.cdn.url_for(&entry.file_name);
        self.prefetch_url(section, &url).await
    }

    async fn prefetch_url(&self, section: &str, url: &str) -> bool {
        if !self.loaded.claim(section) {
            return false;
        }
        match bounded(self.fetch_timeout, self.source.fetch_bundle(url)).await {
            Ok(body) => {
                tracing::debug!(section, bytes = body.len(), "sprite prefetched");
                true
            }
            Err(error) => {
                // The claim stays: an outage must not turn every lookup into a fetch.
                tracing::warn!(%error, section, "sprite prefetch failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::{TimeZone, Utc};
    use iconforge_core::{Bundle, ManifestEntry, ManifestVersion, TagManifest};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::source::FetchError;

    #[derive(Debug, Default)]
    struct CountingSource {
        manifest: Option<Manifest>,
        bundle_outage: bool,
        manifest_fetches: AtomicUsize,
        bundle_fetches: AtomicUsize,
    }

    #[async_trait]
    impl AssetSource for CountingSource {
        async fn fetch_manifest(&self) -> Result<Manifest, FetchError> {
            self.manifest_fetches.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.manifest
                .clone()
                .ok_or_else(|| FetchError::Unavailable("offline".into()))
        }

        async fn fetch_bundle(&self, _url: &str) -> Result<Bytes, FetchError> {
            self.bundle_fetches.fetch_add(1, Ordering::SeqCst);
            if self.bundle_outage {
                return Err(FetchError::Unavailable("bundle host down".into()));
            }
            Ok(Bytes::from_static(b"<svg/>"))
        }

        async fn fetch_tags(&self) -> Result<TagManifest, FetchError> {
            Ok(TagManifest::default())
        }
    }

    fn manifest() -> Manifest {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).single().unwrap();
        let mut manifest = Manifest::new(ManifestVersion::at(at), at);
        let bundle = Bundle::new("core", vec!["cart".into(), "user".into()], "<svg/>");
        manifest.sections.insert(
            "core".into(),
            ManifestEntry::for_bundle(&bundle, at, "production"),
        );
        manifest
    }

    fn resolver(source: Arc<CountingSource>) -> RuntimeIconResolver {
        RuntimeIconResolver::new(
            source,
            ["logo"].into_iter().collect(),
            CdnConfig::default(),
            Arc::new(LoadedSections::new()),
        )
    }

    #[tokio::test]
    async fn known_icon_resolves_to_sprite_ref() {
        let source = Arc::new(CountingSource {
            manifest: Some(manifest()),
            ..CountingSource::default()
        });
        let resolution = resolver(source).resolve("core", "cart").await.unwrap();

        let sprite = match resolution {
            Resolution::Sprite(sprite) => sprite,
            other => panic!("expected sprite, got {other:?}"),
        };
        assert!(sprite.href().starts_with("https://cdn.example.com/icons/sprite-core-"));
        assert!(sprite.href().ends_with(".svg#icon-cart"));
    }

    #[tokio::test]
    async fn critical_icon_is_a_contract_violation() {
        let source = Arc::new(CountingSource::default());
        let err = resolver(source.clone()).resolve("core", "logo").await.unwrap_err();
        assert_eq!(err, ResolveError::CriticalIcon { name: "logo".into() });
        assert_eq!(source.manifest_fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_fetch_degrades_to_not_found_without_refetch() {
        let source = Arc::new(CountingSource::default());
        let resolver = resolver(source.clone());
        for _ in 0..3 {
            assert_eq!(resolver.resolve("core", "cart").await.unwrap(), Resolution::NotFound);
        }
        assert_eq!(source.manifest_fetches.load(Ordering::SeqCst), 1);
        assert!(resolver.is_manifest_loaded());
    }

    #[tokio::test]
    async fn prefetch_happens_once_per_section() {
        let source = Arc::new(CountingSource {
            manifest: Some(manifest()),
            ..CountingSource::default()
        });
        let resolver = resolver(source.clone());
        resolver.resolve("core", "cart").await.unwrap();
        resolver.resolve("core", "user").await.unwrap();
        assert!(!resolver.prefetch_section("core").await);
        assert_eq!(source.bundle_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_prefetch_is_not_retried_per_lookup() {
        let source = Arc::new(CountingSource {
            manifest: Some(manifest()),
            bundle_outage: true,
            ..CountingSource::default()
        });
        let loaded = Arc::new(LoadedSections::new());
        let resolver = RuntimeIconResolver::new(
            source.clone(),
            ["logo"].into_iter().collect(),
            CdnConfig::default(),
            loaded.clone(),
        );

        for _ in 0..5 {
            let resolution = resolver.resolve("core", "cart").await.unwrap();
            assert!(matches!(resolution, Resolution::Sprite(_)));
        }
        assert_eq!(source.bundle_fetches.load(Ordering::SeqCst), 1);
        assert!(loaded.is_loaded("core"));

        loaded.clear();
        assert!(!resolver.prefetch_section("core").await);
        assert_eq!(source.bundle_fetches.load(Ordering::SeqCst), 2);
    }

    #[derive(Debug)]
    struct SilentSource;

    #[async_trait]
    impl AssetSource for SilentSource {
        async fn fetch_manifest(&self) -> Result<Manifest, FetchError> {
            std::future::pending().await
        }

        async fn fetch_bundle(&self, _url: &str) -> Result<Bytes, FetchError> {
            std::future::pending().await
        }

        async fn fetch_tags(&self) -> Result<TagManifest, FetchError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_manifest_host_yields_not_found_after_timeout() {
        let resolver = RuntimeIconResolver::new(
            Arc::new(SilentSource),
            CriticalIconRegistry::default(),
            CdnConfig::default(),
            Arc::new(LoadedSections::new()),
        )
        .with_fetch_timeout(Duration::from_secs(2));

        let lookup = tokio::time::timeout(Duration::from_secs(5), resolver.resolve("core", "cart"));
        assert_eq!(lookup.await.unwrap().unwrap(), Resolution::NotFound);
        assert!(resolver.is_manifest_loaded());
    }
}
