//! Testing utilities for the Iconforge workspace
//!
//! Shared fixtures plus fakes for the store, edge cache, asset source and
//! health probe traits.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use iconforge_core::{IconSource, Manifest, PipelineConfig, RetryPolicy, SourceTree, TagManifest};
use iconforge_deploy::{
    EdgeCache, HealthProbe, InvalidationError, MemoryStore, ObjectHead, ObjectStore, ProbeError,
    ProbeResponse, PutOptions, StoreError, StoredObject,
};
use iconforge_runtime::{AssetSource, FetchError};
use parking_lot::Mutex;

pub const CART_SVG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24">
  <title>Cart</title>
  <path d="M3 3h2l2 12h12l2-8H7"/>
  <circle cx="9" cy="20" r="1"/>
</svg>"#;

pub const USER_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24"><circle cx="12" cy="8" r="4"/><path d="M4 21c0-4 4-6 8-6s8 2 8 6"/></svg>"#;

pub const HEART_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24"><path d="M12 21l-8-8a5 5 0 0 1 8-6 5 5 0 0 1 8 6z"/></svg>"#;

pub const SHARE_SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24"><circle cx="18" cy="5" r="3"/><circle cx="6" cy="12" r="3"/></svg>"#;

/// A distinct, valid icon for any name
#[must_use]
pub fn generated_svg(name: &str) -> String {
    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24"><path d="M0 0L{}"/></svg>"#,
        name.len()
    )
}

/// Fixture markup for the well-known names, generated markup otherwise
#[must_use]
pub fn icon(section: &str, name: &str) -> IconSource {
    let markup = match name {
        "cart" => CART_SVG.to_string(),
        "user" => USER_SVG.to_string(),
        "heart" => HEART_SVG.to_string(),
        "share" => SHARE_SVG.to_string(),
        other => generated_svg(other),
    };
    IconSource::new(section, name, markup)
}

/// `core/{cart, user}`
#[must_use]
pub fn core_tree() -> SourceTree {
    [icon("core", "cart"), icon("core", "user")]
        .into_iter()
        .collect()
}

/// `core/{cart, user}` plus `social/{share}`
#[must_use]
pub fn two_section_tree() -> SourceTree {
    core_tree().with(icon("social", "share"))
}

/// Write `tree` as `<dir>/<section>/<name>.svg`
pub fn write_tree(dir: &Path, tree: &SourceTree) {
    for (section, sources) in tree.sections() {
        let section_dir = dir.join(section);
        std::fs::create_dir_all(&section_dir).unwrap();
        for source in sources {
            std::fs::write(
                section_dir.join(format!("{}.svg", source.name())),
                source.raw_content(),
            )
            .unwrap();
        }
    }
}

/// Config with a millisecond retry backoff and `logo` as critical icon
#[must_use]
pub fn test_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_environment("test")
        .with_critical_icons(["logo"])
        .with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
        })
}

/// Fixed instant on the fixture day
#[must_use]
pub fn instant(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 9, minute, 0)
        .single()
        .unwrap()
}

/// Memory store with injectable `put` failures
///
/// A rule matches keys by suffix or prefix and fails that many attempts (or
/// forever) with a retryable error.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    rules: Mutex<Vec<(KeyMatch, Option<usize>)>>,
    failed_puts: AtomicUsize,
}

#[derive(Debug)]
enum KeyMatch {
    Suffix(String),
    Prefix(String),
}

impl KeyMatch {
    fn matches(&self, key: &str) -> bool {
        match self {
            Self::Suffix(suffix) => key.ends_with(suffix.as_str()),
            Self::Prefix(prefix) => key.starts_with(prefix.as_str()),
        }
    }
}

impl FlakyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` puts of keys ending in `suffix`
    pub fn fail_next(&self, suffix: &str, times: usize) {
        self.rules
            .lock()
            .push((KeyMatch::Suffix(suffix.to_string()), Some(times)));
    }

    /// Fail every put of keys ending in `suffix`
    pub fn fail_always(&self, suffix: &str) {
        self.rules
            .lock()
            .push((KeyMatch::Suffix(suffix.to_string()), None));
    }

    /// Fail the next `times` puts of keys starting with `prefix`
    pub fn fail_next_under(&self, prefix: &str, times: usize) {
        self.rules
            .lock()
            .push((KeyMatch::Prefix(prefix.to_string()), Some(times)));
    }

    /// Fail every put of keys starting with `prefix`
    pub fn fail_always_under(&self, prefix: &str) {
        self.rules
            .lock()
            .push((KeyMatch::Prefix(prefix.to_string()), None));
    }

    /// Remove every failure rule
    pub fn heal(&self) {
        self.rules.lock().clear();
    }

    #[must_use]
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    #[must_use]
    pub fn failed_puts(&self) -> usize {
        self.failed_puts.load(Ordering::SeqCst)
    }

    fn should_fail(&self, key: &str) -> bool {
        let mut rules = self.rules.lock();
        for (rule, remaining) in rules.iter_mut() {
            if !rule.matches(key) {
                continue;
            }
            match remaining {
                None => return true,
                Some(0) => {}
                Some(n) => {
                    *n -= 1;
                    return true;
                }
            }
        }
        false
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<(), StoreError> {
        if self.should_fail(key) {
            self.failed_puts.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable {
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }
        self.inner.put(key, body, options).await
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, StoreError> {
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        self.inner.get(key).await
    }
}

/// Edge cache remembering every invalidation request
#[derive(Debug, Default)]
pub struct RecordingEdgeCache {
    requests: Mutex<Vec<Vec<String>>>,
    fail: AtomicBool,
}

impl RecordingEdgeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose requests are recorded and then rejected
    #[must_use]
    pub fn failing() -> Self {
        let cache = Self::default();
        cache.fail.store(true, Ordering::SeqCst);
        cache
    }

    #[must_use]
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<Vec<String>> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl EdgeCache for RecordingEdgeCache {
    async fn invalidate(&self, paths: &[String]) -> Result<(), InvalidationError> {
        self.requests.lock().push(paths.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(InvalidationError::Status { status: 503 });
        }
        Ok(())
    }
}

/// Asset source serving fixed documents and counting fetches
#[derive(Debug, Default)]
pub struct StaticAssetSource {
    manifest: Option<Manifest>,
    tags: Option<TagManifest>,
    delay: Option<Duration>,
    manifest_fetches: AtomicUsize,
    bundle_fetches: AtomicUsize,
    tag_fetches: AtomicUsize,
}

impl StaticAssetSource {
    /// Source where every fetch fails
    #[must_use]
    pub fn offline() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: TagManifest) -> Self {
        self.tags = Some(tags);
        self
    }

    /// Delay every manifest fetch (to observe queued callers)
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn manifest_fetches(&self) -> usize {
        self.manifest_fetches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn bundle_fetches(&self) -> usize {
        self.bundle_fetches.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn tag_fetches(&self) -> usize {
        self.tag_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetSource for StaticAssetSource {
    async fn fetch_manifest(&self) -> Result<Manifest, FetchError> {
        self.manifest_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.manifest
            .clone()
            .ok_or_else(|| FetchError::Unavailable("offline".to_string()))
    }

    async fn fetch_bundle(&self, _url: &str) -> Result<Bytes, FetchError> {
        self.bundle_fetches.fetch_add(1, Ordering::SeqCst);
        match self.manifest {
            Some(_) => Ok(Bytes::from_static(b"<svg/>")),
            None => Err(FetchError::Unavailable("offline".to_string())),
        }
    }

    async fn fetch_tags(&self) -> Result<TagManifest, FetchError> {
        self.tag_fetches.fetch_add(1, Ordering::SeqCst);
        self.tags
            .clone()
            .ok_or_else(|| FetchError::Unavailable("offline".to_string()))
    }
}

/// Health probe answering from a URL table
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    responses: Mutex<HashMap<String, ProbeResponse>>,
}

impl ScriptedProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to `url` with `status`, optional `Content-Encoding` and `body`
    #[must_use]
    pub fn respond(
        self,
        url: &str,
        status: u16,
        content_encoding: Option<&str>,
        body: impl Into<Bytes>,
    ) -> Self {
        let headers = content_encoding
            .map(|e| ("content-encoding".to_string(), e.to_string()))
            .into_iter()
            .collect();
        self.responses.lock().insert(
            url.to_string(),
            ProbeResponse {
                status,
                headers,
                body: body.into(),
                latency: Duration::from_millis(15),
            },
        );
        self
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn fetch(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        self.responses
            .lock()
            .get(url)
            .cloned()
            .ok_or(ProbeError::Timeout(Duration::from_secs(10)))
    }
}
