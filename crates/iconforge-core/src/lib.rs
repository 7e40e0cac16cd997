//! Iconforge Core
//!
//! Shared data model of the icon sprite pipeline.
//!
//! # Core Concepts
//!
//! - [`IconSource`] / [`SourceTree`]: authored icons grouped by section
//! - [`CriticalIconRegistry`]: names that are only ever inlined
//! - [`Bundle`]: one section's compiled, content-addressed sprite
//! - [`ContentHash`]: 32-byte Blake3 digest naming each bundle
//! - [`Manifest`]: the single mutable pointer to the current bundles
//! - [`TagManifest`]: content-system tags mapped to asset URLs
//! - [`PipelineConfig`]: TOML-backed configuration
//!
//! # Example
//!
//! ```rust
//! use iconforge_core::{Bundle, IconSource};
//!
//! let source = IconSource::new("core", "cart", "<svg viewBox=\"0 0 24 24\"/>");
//! assert_eq!(source.symbol_id(), "icon-cart");
//!
//! let bundle = Bundle::new("core", vec!["cart".into()], "<svg/>");
//! assert!(bundle.file_name().starts_with("sprite-core-"));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod bundle;
mod config;
mod hash;
mod manifest;
mod registry;
mod source;

pub mod observability;

pub use bundle::{bundle_file_name, Bundle, SVG_CONTENT_TYPE};
pub use config::{
    CachePolicy, CdnConfig, ConfigError, HealthConfig, Limits, PipelineConfig, RetryPolicy,
    RuntimeConfig,
};
pub use hash::{ContentHash, HashError, SHORT_HASH_LEN};
pub use manifest::{
    Manifest, ManifestEntry, ManifestError, ManifestVersion, TagManifest, JSON_CONTENT_TYPE,
    MANIFEST_KEY,
};
pub use registry::CriticalIconRegistry;
pub use source::{symbol_id, IconSource, SourceError, SourceTree, SYMBOL_PREFIX};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
