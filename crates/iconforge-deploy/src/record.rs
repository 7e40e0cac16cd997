//! Deployment audit trail

use std::sync::Arc;

use chrono::{DateTime, Utc};
use iconforge_core::ManifestVersion;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::encoding::Encoding;

/// Key prefix of persisted records
pub const DEPLOYMENTS_PREFIX: &str = "deployments";

/// What a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentKind {
    Deploy,
    Rollback,
}

/// How the run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum Outcome {
    /// Still running
    Pending,
    /// The manifest was published (or was already current)
    Committed,
    /// Aborted before or during the manifest publish
    Failed { reason: String },
}

/// One published (or already present) object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRecord {
    pub key: String,
    pub section: String,
    pub encoding: Encoding,
    pub size: u64,
}

/// Audit entry for one deploy or rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub id: Ulid,
    pub kind: DeploymentKind,
    pub environment: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Manifest version current before this run
    pub previous_version: Option<ManifestVersion>,
    /// Manifest version current after this run
    pub manifest_version: Option<ManifestVersion>,
    /// Objects written by this run
    pub uploaded: Vec<ObjectRecord>,
    /// Dirty objects already present in the store
    pub skipped: Vec<ObjectRecord>,
    /// Sections carried forward without upload
    pub unchanged_sections: Vec<String>,
    /// Sections dropped from the manifest
    pub removed_sections: Vec<String>,
    /// Paths submitted for invalidation
    pub invalidation_paths: Vec<String>,
    pub invalidation_ok: bool,
    pub outcome: Outcome,
}

impl DeploymentRecord {
    /// Fresh pending record
    #[must_use]
    pub fn start(kind: DeploymentKind, environment: impl Into<String>) -> Self {
        Self {
            id: Ulid::new(),
            kind,
            environment: environment.into(),
            started_at: Utc::now(),
            finished_at: None,
            previous_version: None,
            manifest_version: None,
            uploaded: Vec::new(),
            skipped: Vec::new(),
            unchanged_sections: Vec::new(),
            removed_sections: Vec::new(),
            invalidation_paths: Vec::new(),
            invalidation_ok: false,
            outcome: Outcome::Pending,
        }
    }

    /// Compressed variants written or already present
    pub fn variants(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.uploaded
            .iter()
            .chain(&self.skipped)
            .filter(|o| o.encoding != Encoding::Identity)
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.outcome == Outcome::Committed
    }

    pub(crate) fn commit(&mut self, version: ManifestVersion) {
        self.manifest_version = Some(version);
        self.outcome = Outcome::Committed;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, reason: impl ToString) {
        self.outcome = Outcome::Failed {
            reason: reason.to_string(),
        };
        self.finished_at = Some(Utc::now());
    }

    /// Key under which this record is persisted
    #[must_use]
    pub fn key(&self) -> String {
        format!("{DEPLOYMENTS_PREFIX}/{}.json", self.id)
    }
}

/// In-process append-only log of records
#[derive(Debug, Clone, Default)]
pub struct DeploymentLog {
    records: Arc<RwLock<Vec<DeploymentRecord>>>,
}

impl DeploymentLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: DeploymentRecord) {
        self.records.write().push(record);
    }

    /// Snapshot, oldest first
    #[must_use]
    pub fn records(&self) -> Vec<DeploymentRecord> {
        self.records.read().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<DeploymentRecord> {
        self.records.read().last().cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
