//! Deploy-side error types

use iconforge_core::{ManifestError, ManifestVersion};

use crate::history::HistoryError;
use crate::store::StoreError;

/// A single object could not be published
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Retries exhausted (or a permanent store error)
    #[error("upload of {key} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        key: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// The write succeeded but `head` does not see the object
    #[error("upload of {key} could not be confirmed")]
    NotConfirmed { key: String },

    /// Compression failed
    #[error("failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// The manifest could not be made current
#[derive(Debug, thiserror::Error)]
pub enum ManifestPublishError {
    /// A newer (or equal) manifest is already current
    #[error("manifest {candidate} superseded by current {current}")]
    Superseded {
        current: ManifestVersion,
        candidate: ManifestVersion,
    },

    /// Retries exhausted
    #[error("manifest publish failed after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: StoreError,
    },

    #[error("manifest could not be encoded: {0}")]
    Encode(#[source] ManifestError),
}

impl ManifestPublishError {
    /// Whether rerunning the deploy may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Exhausted { source, .. } => source.is_retryable(),
            Self::Superseded { .. } | Self::Encode(_) => false,
        }
    }
}

/// Deploy failure; the previously current manifest is untouched
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Publish(#[from] ManifestPublishError),

    /// The candidate could not be archived ahead of the commit
    #[error("could not archive manifest: {0}")]
    Archive(#[source] HistoryError),

    /// Reading the current manifest failed
    #[error("could not read current manifest: {0}")]
    Store(#[from] StoreError),
}

impl DeployError {
    /// Whether rerunning the deploy may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upload(UploadError::Exhausted { source, .. }) | Self::Store(source) => {
                source.is_retryable()
            }
            Self::Upload(_) => false,
            Self::Publish(err) => err.is_retryable(),
            Self::Archive(err) => err.is_retryable(),
        }
    }
}

/// Rollback failure; the previously current manifest is untouched
#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    /// Version not in history
    #[error("version {0} is not in the history")]
    UnknownVersion(ManifestVersion),

    /// A bundle referenced by the target is gone
    #[error("version {version} references missing object {key}")]
    MissingBundle { version: ManifestVersion, key: String },

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Publish(#[from] ManifestPublishError),

    #[error("store error during rollback: {0}")]
    Store(#[from] StoreError),
}
