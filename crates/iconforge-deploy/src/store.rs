//! Object store abstraction
//!
//! The distribution layer only needs three operations: `put` with cache
//! metadata, `head` to confirm presence, and `get` to read manifests back.
//!
//! Two backends ship with the crate:
//! - [`MemoryStore`]: in-process, for tests and dry runs
//! - [`FsStore`]: a local directory mirroring the bucket layout; writes go
//!   through a temp file and a rename so a reader never sees a half-written
//!   manifest

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use iconforge_core::ContentHash;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Metadata attached to an object on upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutOptions {
    /// `Content-Type`
    pub content_type: String,
    /// `Cache-Control`
    pub cache_control: String,
    /// `Content-Encoding`, for compressed variants
    pub content_encoding: Option<String>,
    /// Digest of the exact body, used to recognise an object already uploaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<ContentHash>,
}

impl PutOptions {
    /// Options with a type and cache directive
    #[must_use]
    pub fn new(content_type: impl Into<String>, cache_control: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            cache_control: cache_control.into(),
            content_encoding: None,
            content_hash: None,
        }
    }

    /// With `Content-Encoding`
    #[must_use]
    pub fn with_encoding(mut self, encoding: Option<&str>) -> Self {
        self.content_encoding = encoding.map(str::to_string);
        self
    }

    /// With the digest of the body being uploaded
    #[inline]
    #[must_use]
    pub fn with_content_hash(mut self, hash: ContentHash) -> Self {
        self.content_hash = Some(hash);
        self
    }
}

/// Object metadata returned by `head`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHead {
    /// Object key
    pub key: String,
    /// Body size in bytes
    pub size: u64,
    /// Metadata supplied at upload
    pub options: PutOptions,
    /// Last write time
    pub last_modified: DateTime<Utc>,
}

/// A stored object with its body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Metadata
    pub head: ObjectHead,
    /// Body
    pub body: Bytes,
}

/// Object store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Key is empty, absolute, or escapes the store root
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    /// Backend temporarily unavailable
    #[error("store unavailable for {key}: {message}")]
    Unavailable { key: String, message: String },

    /// Backend refused the request
    #[error("store rejected {key}: {message}")]
    Rejected { key: String, message: String },

    /// Filesystem failure
    #[error("io error for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Stored metadata could not be decoded
    #[error("corrupt metadata for {key}: {source}")]
    Metadata {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Whether retrying the same request may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Io { .. })
    }
}

/// Storage backend for published objects
#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
    /// Write an object, replacing any previous one under `key`
    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<(), StoreError>;

    /// Metadata, or `None` if absent
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, StoreError>;

    /// Full object, or `None` if absent
    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError>;
}

fn check_key(key: &str) -> Result<(), StoreError> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment.is_empty() || segment == "..");
    if bad {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// In-memory store
///
/// Counts successful writes so tests can assert on upload volume.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    puts: AtomicUsize,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys in order
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Snapshot of one object
    #[must_use]
    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().get(key).cloned()
    }

    /// Number of successful `put` calls so far
    #[must_use]
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Remove an object (used to simulate lost bundles)
    pub fn remove(&self, key: &str) -> Option<StoredObject> {
        self.objects.write().remove(key)
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<(), StoreError> {
        check_key(key)?;
        let head = ObjectHead {
            key: key.to_string(),
            size: body.len() as u64,
            options,
            last_modified: Utc::now(),
        };
        self.objects
            .write()
            .insert(key.to_string(), StoredObject { head, body });
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, StoreError> {
        check_key(key)?;
        Ok(self.objects.read().get(key).map(|o| o.head.clone()))
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        check_key(key)?;
        Ok(self.objects.read().get(key).cloned())
    }
}

const META_DIR: &str = ".meta";

/// Local directory store
///
/// Bodies live at `<root>/<key>`, metadata at `<root>/.meta/<key>.json`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Store rooted at `root` (created on first write)
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn body_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(META_DIR).join(format!("{key}.json"))
    }

    async fn write_atomic(key: &str, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let io = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io)?;
        }
        let tmp = path.with_extension(format!("tmp-{}", ulid::Ulid::new()));
        tokio::fs::write(&tmp, data).await.map_err(io)?;
        tokio::fs::rename(&tmp, path).await.map_err(io)
    }

    async fn read_head(&self, key: &str) -> Result<Option<ObjectHead>, StoreError> {
        match tokio::fs::read(self.meta_path(key)).await {
            Ok(raw) => serde_json::from_slice(&raw)
                .map(Some)
                .map_err(|source| StoreError::Metadata {
                    key: key.to_string(),
                    source,
                }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<(), StoreError> {
        check_key(key)?;
        let head = ObjectHead {
            key: key.to_string(),
            size: body.len() as u64,
            options,
            last_modified: Utc::now(),
        };
        let meta = serde_json::to_vec_pretty(&head).map_err(|source| StoreError::Metadata {
            key: key.to_string(),
            source,
        })?;
        // Metadata first: a body without metadata would read as absent.
        Self::write_atomic(key, &self.meta_path(key), &meta).await?;
        Self::write_atomic(key, &self.body_path(key), &body).await
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectHead>, StoreError> {
        check_key(key)?;
        let Some(head) = self.read_head(key).await? else {
            return Ok(None);
        };
        match tokio::fs::metadata(self.body_path(key)).await {
            Ok(meta) if meta.len() == head.size => Ok(Some(head)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<StoredObject>, StoreError> {
        check_key(key)?;
        let Some(head) = self.read_head(key).await? else {
            return Ok(None);
        };
        match tokio::fs::read(self.body_path(key)).await {
            Ok(body) => Ok(Some(StoredObject {
                head,
                body: Bytes::from(body),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}
