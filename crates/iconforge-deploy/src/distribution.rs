//! Distribution engine
//!
//! Publishes a [`ManifestDiff`] in three steps:
//!
//! 1. every dirty sprite (original, `.gz`, `.br`) is uploaded concurrently
//!    and confirmed with `head`; objects whose stored digest matches are
//!    skipped
//! 2. the candidate is archived in [`VersionHistory`]
//! 3. only then is `manifest.json` overwritten, which is the commit point
//!
//! A failure before the commit leaves the current manifest untouched, so a
//! reader can never be pointed at a sprite that does not exist, and every
//! version that was ever current can be rolled back to. Orphaned sprites and
//! archives from an aborted run are harmless: nothing references them.
//!
//! Invalidation runs after the commit and is bounded by the configured purge
//! timeout; an edge that never answers costs a warning, not the deployment.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::try_join_all;
use iconforge_build::ManifestDiff;
use iconforge_core::{
    Bundle, CachePolicy, ContentHash, Manifest, PipelineConfig, RetryPolicy, JSON_CONTENT_TYPE,
    MANIFEST_KEY, SVG_CONTENT_TYPE,
};

use crate::edge::{EdgeCache, InvalidationError};
use crate::encoding::{self, Encoding, Variant};
use crate::error::{DeployError, ManifestPublishError, UploadError};
use crate::history::VersionHistory;
use crate::record::{DeploymentKind, DeploymentLog, DeploymentRecord, ObjectRecord};
use crate::retry::{with_retry, Exhausted};
use crate::store::{ObjectHead, ObjectStore, PutOptions, StoreError};

const RECORD_CACHE_CONTROL: &str = "no-cache";

/// How the manifest write treats the currently published version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PublishMode {
    /// Reject unless the candidate is strictly newer
    Monotonic,
    /// Overwrite unconditionally (rollback)
    Replace,
}

/// Invalidation path of an object key
#[must_use]
pub fn edge_path(key: &str) -> String {
    format!("/{key}")
}

/// Uploads sprites and commits manifests for one environment
#[derive(Debug, Clone)]
pub struct DistributionEngine {
    store: Arc<dyn ObjectStore>,
    edge: Arc<dyn EdgeCache>,
    cache: CachePolicy,
    retry: RetryPolicy,
    environment: String,
    history: VersionHistory,
    log: DeploymentLog,
    purge_timeout: Duration,
}

impl DistributionEngine {
    /// Engine over `store`, invalidating through `edge`
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        edge: Arc<dyn EdgeCache>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            history: VersionHistory::new(store.clone()).with_policy(config.retry),
            store,
            edge,
            cache: config.cache,
            retry: config.retry,
            environment: config.environment.clone(),
            log: DeploymentLog::new(),
            purge_timeout: config.cdn.purge_timeout(),
        }
    }

    /// Share an existing deployment log
    #[inline]
    #[must_use]
    pub fn with_log(mut self, log: DeploymentLog) -> Self {
        self.log = log;
        self
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    #[inline]
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    #[inline]
    #[must_use]
    pub fn history(&self) -> &VersionHistory {
        &self.history
    }

    #[inline]
    #[must_use]
    pub fn log(&self) -> &DeploymentLog {
        &self.log
    }

    /// The currently published manifest
    ///
    /// An unparseable manifest is logged and treated as absent, so the next
    /// deploy replaces it with a complete one.
    ///
    /// # Errors
    /// Returns [`StoreError`] if the store cannot be read
    pub async fn current_manifest(&self) -> Result<Option<Manifest>, StoreError> {
        let Some(object) = self.store.get(MANIFEST_KEY).await? else {
            return Ok(None);
        };
        match Manifest::from_json(&object.body) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(error) => {
                tracing::warn!(%error, "current manifest is unreadable, treating as absent");
                Ok(None)
            }
        }
    }

    /// Upload the dirty set, then commit the candidate manifest
    ///
    /// The returned record is also appended to the deployment log; failed
    /// runs are logged too before the error is returned.
    ///
    /// # Errors
    /// Returns [`DeployError`]; in every case the previous manifest stays
    /// current.
    #[tracing::instrument(
        skip_all,
        fields(environment = %self.environment, version = %diff.candidate.version)
    )]
    pub async fn deploy(&self, diff: &ManifestDiff) -> Result<DeploymentRecord, DeployError> {
        let mut record = DeploymentRecord::start(DeploymentKind::Deploy, &self.environment);
        record.unchanged_sections.clone_from(&diff.unchanged);
        record.removed_sections.clone_from(&diff.removed);

        let result = self.distribute(diff, &mut record).await;
        if let Err(error) = &result {
            tracing::error!(%error, "deploy aborted, current manifest unchanged");
            record.fail(error);
        }
        self.append_record(record.clone()).await;
        result.map(|()| record)
    }

    async fn distribute(
        &self,
        diff: &ManifestDiff,
        record: &mut DeploymentRecord,
    ) -> Result<(), DeployError> {
        record.previous_version = self.current_manifest().await?.map(|m| m.version);

        let uploads = try_join_all(diff.dirty.iter().map(|bundle| self.upload_bundle(bundle)))
            .await?;
        for (object, written) in uploads.into_iter().flatten() {
            if written {
                record.uploaded.push(object);
            } else {
                record.skipped.push(object);
            }
        }

        self.ensure_newer(&diff.candidate).await?;
        self.history
            .record(&diff.candidate)
            .await
            .map_err(DeployError::Archive)?;
        self.publish_manifest(&diff.candidate, PublishMode::Monotonic)
            .await?;

        let mut paths = vec![edge_path(MANIFEST_KEY)];
        paths.extend(diff.dirty.iter().flat_map(|bundle| {
            Encoding::ALL.map(|encoding| edge_path(&encoding.key_for(bundle.file_name())))
        }));
        record.invalidation_ok = self.invalidate(&paths).await;
        record.invalidation_paths = paths;
        record.commit(diff.candidate.version);

        tracing::info!(
            uploaded = record.uploaded.len(),
            skipped = record.skipped.len(),
            unchanged = record.unchanged_sections.len(),
            "deploy committed"
        );
        Ok(())
    }

    async fn upload_bundle(&self, bundle: &Bundle) -> Result<Vec<(ObjectRecord, bool)>, UploadError> {
        let variants = encoding::variants(bundle).map_err(|source| UploadError::Encode {
            key: bundle.file_name().to_string(),
            source,
        })?;
        try_join_all(
            variants
                .into_iter()
                .map(|variant| self.upload_object(bundle.section(), variant)),
        )
        .await
    }

    /// Upload one object unless a copy with the same digest already exists
    ///
    /// Returns the record and whether a write happened.
    async fn upload_object(
        &self,
        section: &str,
        variant: Variant,
    ) -> Result<(ObjectRecord, bool), UploadError> {
        let Variant {
            key,
            encoding,
            body,
        } = variant;
        let size = body.len() as u64;
        let object = ObjectRecord {
            key: key.clone(),
            section: section.to_string(),
            encoding,
            size,
        };
        let store = &self.store;
        let exhausted = |e: Exhausted| UploadError::Exhausted {
            key: key.clone(),
            attempts: e.attempts,
            source: e.last,
        };

        let digest = ContentHash::compute(&body);
        let identical =
            |head: &ObjectHead| head.size == size && head.options.content_hash == Some(digest);

        let existing = with_retry(&self.retry, &key, || store.head(&key))
            .await
            .map_err(exhausted)?;
        if existing.as_ref().is_some_and(identical) {
            tracing::debug!(key = %key, "object already present, skipping");
            return Ok((object, false));
        }

        let options = PutOptions::new(SVG_CONTENT_TYPE, self.cache.bundle_directive())
            .with_encoding(encoding.header())
            .with_content_hash(digest);
        with_retry(&self.retry, &key, || {
            store.put(&key, body.clone(), options.clone())
        })
        .await
        .map_err(exhausted)?;

        let confirmed = with_retry(&self.retry, &key, || store.head(&key))
            .await
            .map_err(exhausted)?;
        if !confirmed.as_ref().is_some_and(identical) {
            return Err(UploadError::NotConfirmed { key });
        }
        tracing::debug!(key = %key, %encoding, size, "uploaded object");
        Ok((object, true))
    }

    /// Overwrite `manifest.json` with `manifest`
    pub(crate) async fn publish_manifest(
        &self,
        manifest: &Manifest,
        mode: PublishMode,
    ) -> Result<(), ManifestPublishError> {
        let to_publish_error = |e: Exhausted| ManifestPublishError::Exhausted {
            attempts: e.attempts,
            source: e.last,
        };

        if mode == PublishMode::Monotonic {
            self.ensure_newer(manifest).await?;
        }

        let body = Bytes::from(manifest.to_json().map_err(ManifestPublishError::Encode)?);
        let options = PutOptions::new(JSON_CONTENT_TYPE, self.cache.manifest_directive());
        let store = &self.store;
        with_retry(&self.retry, MANIFEST_KEY, || {
            store.put(MANIFEST_KEY, body.clone(), options.clone())
        })
        .await
        .map_err(to_publish_error)?;

        tracing::info!(version = %manifest.version, sections = manifest.sections.len(), "manifest published");
        Ok(())
    }

    /// Reject `manifest` unless it is strictly newer than the current one
    async fn ensure_newer(&self, manifest: &Manifest) -> Result<(), ManifestPublishError> {
        let current = with_retry(&self.retry, MANIFEST_KEY, || self.current_manifest())
            .await
            .map_err(|e| ManifestPublishError::Exhausted {
                attempts: e.attempts,
                source: e.last,
            })?;
        match current.filter(|c| c.version >= manifest.version) {
            Some(current) => Err(ManifestPublishError::Superseded {
                current: current.version,
                candidate: manifest.version,
            }),
            None => Ok(()),
        }
    }

    /// Submit an invalidation; failures and timeouts are logged and reported as `false`
    pub(crate) async fn invalidate(&self, paths: &[String]) -> bool {
        let request = tokio::time::timeout(self.purge_timeout, self.edge.invalidate(paths));
        match request
            .await
            .unwrap_or(Err(InvalidationError::Timeout(self.purge_timeout)))
        {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(%error, paths = paths.len(), "edge invalidation failed");
                false
            }
        }
    }

    /// Persist and log a record; persistence is best-effort
    pub(crate) async fn append_record(&self, record: DeploymentRecord) {
        match serde_json::to_vec_pretty(&record) {
            Ok(body) => {
                let options = PutOptions::new(JSON_CONTENT_TYPE, RECORD_CACHE_CONTROL);
                if let Err(error) = self.store.put(&record.key(), Bytes::from(body), options).await {
                    tracing::warn!(%error, id = %record.id, "failed to persist deployment record");
                }
            }
            Err(error) => tracing::warn!(%error, id = %record.id, "failed to encode deployment record"),
        }
        self.log.append(record);
    }
}
