//! Iconforge Deploy
//!
//! Everything that talks to the outside world on the publishing side:
//!
//! - [`DistributionEngine`]: upload dirty sprites, then commit `manifest.json`
//! - [`RollbackManager`]: republish an archived manifest
//! - [`VersionHistory`]: archive of every manifest that was current
//! - [`HealthMonitor`]: periodic read-only probes with alerting
//! - [`Pipeline`]: load → validate → compile → diff → distribute
//!
//! Storage and edge invalidation sit behind the [`ObjectStore`] and
//! [`EdgeCache`] traits.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod distribution;
pub mod edge;
pub mod encoding;
pub mod error;
pub mod health;
pub mod history;
pub mod pipeline;
pub mod record;
pub mod retry;
pub mod rollback;
pub mod store;

pub use distribution::{edge_path, DistributionEngine};
pub use edge::{EdgeCache, HttpPurgeClient, InvalidationError, NoopEdgeCache};
pub use encoding::{Encoding, Variant};
pub use error::{DeployError, ManifestPublishError, RollbackError, UploadError};
pub use health::{
    AlertSink, CheckResult, HealthMonitor, HealthProbe, HealthReport, HealthStatus, HttpProbe,
    LogAlertSink, ProbeError, ProbeResponse,
};
pub use history::{history_key, HistoryError, VersionHistory, HISTORY_INDEX_KEY};
pub use pipeline::{BuildOutput, Pipeline, PipelineError};
pub use record::{DeploymentKind, DeploymentLog, DeploymentRecord, ObjectRecord, Outcome};
pub use rollback::{RollbackManager, RollbackOutcome};
pub use store::{FsStore, MemoryStore, ObjectHead, ObjectStore, PutOptions, StoreError, StoredObject};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
