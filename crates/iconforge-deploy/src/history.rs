//! Version history
//!
//! Every manifest is copied to `history/{version}.json` and appended to
//! `history/index.json` before it becomes current, so a committed version is
//! always restorable. Rollback reads from here.

use std::sync::Arc;

use bytes::Bytes;
use iconforge_core::{Manifest, ManifestError, ManifestVersion, RetryPolicy, JSON_CONTENT_TYPE};

use crate::retry::{with_retry, Exhausted};
use crate::store::{ObjectStore, PutOptions, StoreError};

/// Key prefix of archived manifests
pub const HISTORY_PREFIX: &str = "history";

/// Key of the ordered version index
pub const HISTORY_INDEX_KEY: &str = "history/index.json";

const HISTORY_CACHE_CONTROL: &str = "no-cache";

/// History access errors
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// Retries exhausted on an archive or index access
    #[error("history access to {key} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        key: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// An archived manifest no longer parses
    #[error("corrupt archived manifest {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: ManifestError,
    },

    /// The index no longer parses
    #[error("corrupt history index: {0}")]
    Index(#[source] serde_json::Error),
}

impl HistoryError {
    fn exhausted(key: &str) -> impl FnOnce(Exhausted) -> Self + '_ {
        move |e| Self::Exhausted {
            key: key.to_string(),
            attempts: e.attempts,
            source: e.last,
        }
    }

    /// Whether trying again may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Exhausted { source, .. } => source.is_retryable(),
            Self::Corrupt { .. } | Self::Index(_) => false,
        }
    }
}

/// Key of an archived manifest
#[must_use]
pub fn history_key(version: &ManifestVersion) -> String {
    format!("{HISTORY_PREFIX}/{version}.json")
}

/// Append-only archive of published manifests
#[derive(Debug, Clone)]
pub struct VersionHistory {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
}

impl VersionHistory {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Backoff applied to every archive and index access
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Archive `manifest` and add its version to the index
    ///
    /// Re-recording a version already in the index is a no-op for the index.
    ///
    /// # Errors
    /// Returns [`HistoryError`] if the archive or index write fails
    pub async fn record(&self, manifest: &Manifest) -> Result<(), HistoryError> {
        let key = history_key(&manifest.version);
        let body = manifest.to_json().map_err(|source| HistoryError::Corrupt {
            key: key.clone(),
            source,
        })?;
        let body = Bytes::from(body);
        with_retry(&self.retry, &key, || {
            self.store.put(&key, body.clone(), Self::options())
        })
        .await
        .map_err(HistoryError::exhausted(&key))?;

        let mut versions = self.versions().await?;
        if let Err(at) = versions.binary_search(&manifest.version) {
            versions.insert(at, manifest.version);
            let index =
                Bytes::from(serde_json::to_vec_pretty(&versions).map_err(HistoryError::Index)?);
            with_retry(&self.retry, HISTORY_INDEX_KEY, || {
                self.store
                    .put(HISTORY_INDEX_KEY, index.clone(), Self::options())
            })
            .await
            .map_err(HistoryError::exhausted(HISTORY_INDEX_KEY))?;
        }
        tracing::debug!(version = %manifest.version, "archived manifest");
        Ok(())
    }

    /// Archived versions, oldest first
    ///
    /// # Errors
    /// Returns [`HistoryError`] if the index cannot be read
    pub async fn versions(&self) -> Result<Vec<ManifestVersion>, HistoryError> {
        let index = with_retry(&self.retry, HISTORY_INDEX_KEY, || {
            self.store.get(HISTORY_INDEX_KEY)
        })
        .await
        .map_err(HistoryError::exhausted(HISTORY_INDEX_KEY))?;
        match index {
            Some(object) => {
                let mut versions: Vec<ManifestVersion> =
                    serde_json::from_slice(&object.body).map_err(HistoryError::Index)?;
                versions.sort_unstable();
                versions.dedup();
                Ok(versions)
            }
            None => Ok(Vec::new()),
        }
    }

    /// Archived manifest for `version`, if any
    ///
    /// # Errors
    /// Returns [`HistoryError`] on store failure or a corrupt archive
    pub async fn load(&self, version: &ManifestVersion) -> Result<Option<Manifest>, HistoryError> {
        let key = history_key(version);
        let object = with_retry(&self.retry, &key, || self.store.get(&key))
            .await
            .map_err(HistoryError::exhausted(&key))?;
        let Some(object) = object else {
            return Ok(None);
        };
        Manifest::from_json(&object.body)
            .map(Some)
            .map_err(|source| HistoryError::Corrupt { key, source })
    }

    fn options() -> PutOptions {
        PutOptions::new(JSON_CONTENT_TYPE, HISTORY_CACHE_CONTROL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};

    fn manifest(minute: u32) -> Manifest {
        let at = Utc
            .with_ymd_and_hms(2026, 10, 16, 9, minute, 0)
            .single()
            .unwrap();
        Manifest::new(ManifestVersion::at(at), at)
    }

    #[tokio::test]
    async fn empty_history() {
        let history = VersionHistory::new(Arc::new(MemoryStore::new()));
        assert!(history.versions().await.unwrap().is_empty());
        assert!(history.load(&manifest(0).version).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn records_in_version_order() {
        let store = Arc::new(MemoryStore::new());
        let history = VersionHistory::new(store.clone());
        let (a, b) = (manifest(1), manifest(2));

        history.record(&b).await.unwrap();
        history.record(&a).await.unwrap();
        history.record(&b).await.unwrap();

        assert_eq!(history.versions().await.unwrap(), vec![a.version, b.version]);
        assert_eq!(history.load(&a.version).await.unwrap(), Some(a.clone()));
        assert!(store.keys().contains(&history_key(&a.version)));
    }
}
