//! Rollback
//!
//! Rolling back is one write: an archived manifest is republished as-is.
//! Sprites are never touched, which is why every referenced sprite is checked
//! first; a target pointing at a missing object is refused.

use std::sync::Arc;

use iconforge_core::{ManifestVersion, MANIFEST_KEY};

use crate::distribution::{edge_path, DistributionEngine, PublishMode};
use crate::error::RollbackError;
use crate::record::{DeploymentKind, DeploymentRecord};

/// Result of a rollback request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The target was already current; nothing was written
    AlreadyCurrent(ManifestVersion),
    /// The target was republished
    RolledBack(DeploymentRecord),
}

/// Restores archived manifests through a [`DistributionEngine`]
#[derive(Debug, Clone)]
pub struct RollbackManager {
    engine: Arc<DistributionEngine>,
}

impl RollbackManager {
    #[must_use]
    pub fn new(engine: Arc<DistributionEngine>) -> Self {
        Self { engine }
    }

    /// Archived versions available as targets, oldest first
    ///
    /// # Errors
    /// Returns [`RollbackError::History`] if the index cannot be read
    pub async fn available(&self) -> Result<Vec<ManifestVersion>, RollbackError> {
        Ok(self.engine.history().versions().await?)
    }

    /// Make `target` the current manifest again
    ///
    /// # Errors
    /// Returns [`RollbackError`]; the previously current manifest stays
    /// current on every error path.
    #[tracing::instrument(skip(self), fields(environment = %self.engine.environment()))]
    pub async fn rollback(&self, target: ManifestVersion) -> Result<RollbackOutcome, RollbackError> {
        let manifest = self
            .engine
            .history()
            .load(&target)
            .await?
            .ok_or(RollbackError::UnknownVersion(target))?;

        let current = self.engine.current_manifest().await?;
        if current.as_ref().is_some_and(|c| c.version == target) {
            tracing::info!(%target, "rollback target is already current");
            return Ok(RollbackOutcome::AlreadyCurrent(target));
        }

        let mut record = DeploymentRecord::start(DeploymentKind::Rollback, self.engine.environment());
        record.previous_version = current.map(|c| c.version);

        for key in manifest.file_names() {
            if self.engine.store().head(key).await?.is_none() {
                let error = RollbackError::MissingBundle {
                    version: target,
                    key: key.to_string(),
                };
                record.fail(&error);
                self.engine.append_record(record).await;
                return Err(error);
            }
        }

        if let Err(error) = self
            .engine
            .publish_manifest(&manifest, PublishMode::Replace)
            .await
        {
            tracing::error!(%error, %target, "rollback publish failed, current manifest unchanged");
            record.fail(&error);
            self.engine.append_record(record).await;
            return Err(error.into());
        }

        let paths = vec![edge_path(MANIFEST_KEY)];
        record.invalidation_ok = self.engine.invalidate(&paths).await;
        record.invalidation_paths = paths;
        record.commit(target);
        self.engine.append_record(record.clone()).await;

        tracing::info!(%target, "rolled back");
        Ok(RollbackOutcome::RolledBack(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::NoopEdgeCache;
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use iconforge_build::ManifestBuilder;
    use iconforge_core::{Bundle, PipelineConfig};

    fn at(minute: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, minute, 0)
            .single()
            .unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Arc<DistributionEngine>) {
        let store = Arc::new(MemoryStore::new());
        let engine = DistributionEngine::new(
            store.clone(),
            Arc::new(NoopEdgeCache),
            &PipelineConfig::default(),
        );
        (store, Arc::new(engine))
    }

    #[tokio::test]
    async fn unknown_version_is_rejected() {
        let (_, engine) = setup();
        let target = ManifestVersion::at(at(0));
        let err = RollbackManager::new(engine)
            .rollback(target)
            .await
            .unwrap_err();
        assert!(matches!(err, RollbackError::UnknownVersion(v) if v == target));
    }

    #[tokio::test]
    async fn rollback_to_current_is_a_noop() {
        let (store, engine) = setup();
        let diff = ManifestBuilder::new("production").build(
            vec![Bundle::new("core", vec!["cart".into()], "<svg>a</svg>")],
            None,
            at(0),
        );
        engine.deploy(&diff).await.unwrap();
        let puts = store.put_count();

        let outcome = RollbackManager::new(engine)
            .rollback(diff.candidate.version)
            .await
            .unwrap();
        assert_eq!(outcome, RollbackOutcome::AlreadyCurrent(diff.candidate.version));
        assert_eq!(store.put_count(), puts);
    }

    #[tokio::test]
    async fn missing_bundle_blocks_rollback() {
        let (store, engine) = setup();
        let builder = ManifestBuilder::new("production");
        let a = builder.build(
            vec![Bundle::new("core", vec!["cart".into()], "<svg>a</svg>")],
            None,
            at(0),
        );
        engine.deploy(&a).await.unwrap();
        let b = builder.build(
            vec![Bundle::new("core", vec!["cart".into()], "<svg>b</svg>")],
            Some(&a.candidate),
            at(1),
        );
        engine.deploy(&b).await.unwrap();

        let lost = a.candidate.entry("core").unwrap().file_name.clone();
        store.remove(&lost);

        let err = RollbackManager::new(engine.clone())
            .rollback(a.candidate.version)
            .await
            .unwrap_err();
        assert!(matches!(err, RollbackError::MissingBundle { key, .. } if key == lost));
        assert_eq!(
            engine.current_manifest().await.unwrap().unwrap().version,
            b.candidate.version
        );
    }
}
