//! Pipeline configuration
//!
//! Loaded from TOML. Every field has a default so a minimal file only needs
//! to name what differs:
//!
//! ```toml
//! source_dir = "assets/icons"
//! environment = "production"
//! critical_icons = ["logo", "menu", "search"]
//!
//! [cdn]
//! base_url = "https://cdn.example.com/icons"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::registry::CriticalIconRegistry;

/// Top-level pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the `<section>/<name>.svg` source tree
    pub source_dir: PathBuf,
    /// Environment name recorded in manifest entries
    pub environment: String,
    /// Names reserved for inline-only icons
    pub critical_icons: CriticalIconRegistry,
    /// Naming and size rules
    pub limits: Limits,
    /// Public distribution endpoints
    pub cdn: CdnConfig,
    /// Cache directives applied on upload
    pub cache: CachePolicy,
    /// Upload / publish retry policy
    pub retry: RetryPolicy,
    /// Client-side resolver settings
    pub runtime: RuntimeConfig,
    /// Health monitor settings
    pub health: HealthConfig,
}

impl PipelineConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed input
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// With source directory
    #[must_use]
    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = dir.into();
        self
    }

    /// With environment name
    #[must_use]
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// With reserved critical names
    #[must_use]
    pub fn with_critical_icons<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.critical_icons = names.into_iter().collect();
        self
    }

    /// With CDN base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.cdn.base_url = url.into();
        self
    }

    /// With retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Where clients fetch the current manifest
    #[must_use]
    pub fn manifest_url(&self) -> String {
        self.runtime
            .manifest_url
            .clone()
            .unwrap_or_else(|| self.cdn.url_for(crate::manifest::MANIFEST_KEY))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("icons"),
            environment: "production".to_string(),
            critical_icons: CriticalIconRegistry::default(),
            limits: Limits::default(),
            cdn: CdnConfig::default(),
            cache: CachePolicy::default(),
            retry: RetryPolicy::default(),
            runtime: RuntimeConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

/// Naming and size rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum icon / section name length
    pub max_name_len: usize,
    /// Soft limit for one source, in bytes
    pub icon_soft_limit: u64,
    /// Soft limit for one compiled sprite, in bytes
    pub bundle_soft_limit: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_name_len: 50,
            icon_soft_limit: 5 * 1024,
            bundle_soft_limit: 100 * 1024,
        }
    }
}

/// Public endpoints of the distribution layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CdnConfig {
    /// URL prefix under which published keys are served
    pub base_url: String,
    /// Optional purge endpoint; invalidation is skipped when unset
    pub purge_endpoint: Option<String>,
    /// Upper bound on one invalidation request
    pub purge_timeout_secs: u64,
}

impl CdnConfig {
    /// Public URL for an object key
    #[must_use]
    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{key}", self.base_url.trim_end_matches('/'))
    }

    #[must_use]
    pub fn purge_timeout(&self) -> Duration {
        Duration::from_secs(self.purge_timeout_secs)
    }
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            base_url: "https://cdn.example.com/icons".to_string(),
            purge_endpoint: None,
            purge_timeout_secs: 30,
        }
    }
}

/// `Cache-Control` max ages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// Content-hashed sprites (one year)
    pub bundle_max_age_secs: u64,
    /// The mutable manifest
    pub manifest_max_age_secs: u64,
}

impl CachePolicy {
    /// Directive for immutable sprite objects
    #[must_use]
    pub fn bundle_directive(&self) -> String {
        format!("public, max-age={}, immutable", self.bundle_max_age_secs)
    }

    /// Directive for the manifest
    #[must_use]
    pub fn manifest_directive(&self) -> String {
        format!("public, max-age={}", self.manifest_max_age_secs)
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            bundle_max_age_secs: 31_536_000,
            manifest_max_age_secs: 300,
        }
    }
}

/// Exponential backoff for uploads and manifest writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub base_delay_ms: u64,
}

impl RetryPolicy {
    /// Delay to wait after `attempt` (1-based) failed
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

/// Client-side resolver settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Manifest URL; defaults to `{cdn.base_url}/manifest.json` when unset
    pub manifest_url: Option<String>,
    /// Dynamic tag manifest endpoint
    pub tags_url: String,
    /// Freshness window of the cached tag manifest
    pub tags_ttl_secs: u64,
    /// Upper bound on one manifest, sprite or tag fetch
    pub fetch_timeout_secs: u64,
}

impl RuntimeConfig {
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    #[must_use]
    pub fn tags_ttl(&self) -> Duration {
        Duration::from_secs(self.tags_ttl_secs)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            manifest_url: None,
            tags_url: "https://cms.example.com/asset-tags.json".to_string(),
            tags_ttl_secs: 300,
            fetch_timeout_secs: 10,
        }
    }
}

/// Health monitor thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Probe interval
    pub interval_secs: u64,
    /// Responses slower than this are a warning
    pub slow_threshold_ms: u64,
    /// A manifest older than this is a warning
    pub stale_after_secs: u64,
    /// Upper bound on a single request
    pub probe_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            slow_threshold_ms: 1_000,
            stale_after_secs: 7 * 24 * 3600,
            probe_timeout_secs: 10,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML could not be parsed
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let config = PipelineConfig::new();
        assert_eq!(config.limits.max_name_len, 50);
        assert_eq!(config.limits.icon_soft_limit, 5120);
        assert_eq!(config.limits.bundle_soft_limit, 102_400);
        assert_eq!(
            config.cache.bundle_directive(),
            "public, max-age=31536000, immutable"
        );
        assert_eq!(config.cache.manifest_directive(), "public, max-age=300");
        assert_eq!(config.runtime.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.cdn.purge_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            environment = "staging"
            critical_icons = ["logo", "menu"]

            [cdn]
            base_url = "https://assets.example.org/icons/"

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.environment, "staging");
        assert!(config.critical_icons.contains("menu"));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 200);
        assert_eq!(
            config.cdn.url_for("manifest.json"),
            "https://assets.example.org/icons/manifest.json"
        );
    }

    #[test]
    fn malformed_toml_is_rejected() {
        let result = PipelineConfig::from_toml("environment = [");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn backoff_doubles() {
        let retry = RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 100,
        };
        assert_eq!(retry.delay_after(1), Duration::from_millis(100));
        assert_eq!(retry.delay_after(2), Duration::from_millis(200));
        assert_eq!(retry.delay_after(3), Duration::from_millis(400));
    }

    #[test]
    fn builder_methods() {
        let config = PipelineConfig::new()
            .with_environment("preview")
            .with_critical_icons(["logo"])
            .with_source_dir("assets");
        assert_eq!(config.environment, "preview");
        assert!(config.critical_icons.contains("logo"));
        assert_eq!(config.source_dir, PathBuf::from("assets"));
    }
}
