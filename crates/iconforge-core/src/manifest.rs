//! Published manifests
//!
//! The [`Manifest`] is the single mutable pointer of the system: bundles are
//! immutable and content-addressed, the manifest says which bundle is current
//! for each section. Its JSON form flattens sections next to `version` and
//! `lastUpdate`:
//!
//! ```text
//! { "version": "20261016T120000.000Z", "lastUpdate": "...",
//!   "core": { "fileName": "sprite-core-1a2b3c4d.svg", "hash": "...",
//!             "icons": ["cart", "user"], "size": 812,
//!             "deployedAt": "...", "environment": "production" } }
//! ```
//!
//! [`TagManifest`] is the independently-updated mapping from content tags to
//! asset URLs.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Duration, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::bundle::Bundle;
use crate::hash::ContentHash;
use crate::source::symbol_id;

/// Well-known key of the current manifest.
pub const MANIFEST_KEY: &str = "manifest.json";

/// Content type of manifest objects.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Monotonic, timestamp-derived manifest version
///
/// Rendered as `YYYYMMDDTHHMMSS.mmmZ`; the fixed width makes lexicographic
/// order equal chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ManifestVersion(DateTime<Utc>);

impl ManifestVersion {
    /// Version for an instant, truncated to milliseconds
    #[must_use]
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant.trunc_subsecs(3))
    }

    /// A version for `now` that is strictly greater than `previous`
    ///
    /// Clock skew or two builds within one millisecond would otherwise
    /// produce equal or decreasing versions.
    #[must_use]
    pub fn next_after(previous: Option<&ManifestVersion>, now: DateTime<Utc>) -> Self {
        let candidate = Self::at(now);
        match previous {
            Some(prev) if candidate <= *prev => Self(prev.0 + Duration::milliseconds(1)),
            _ => candidate,
        }
    }

    /// Instant this version was minted for
    #[inline]
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Display for ManifestVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%dT%H%M%S.%3fZ"))
    }
}

impl FromStr for ManifestVersion {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ManifestError::InvalidVersion(s.to_string());
        let b = s.as_bytes();
        if b.len() != 20 || b[8] != b'T' || b[15] != b'.' || b[19] != b'Z' {
            return Err(invalid());
        }
        let field = |range: std::ops::Range<usize>| -> Result<u32, ManifestError> {
            s.get(range)
                .filter(|digits| digits.bytes().all(|c| c.is_ascii_digit()))
                .and_then(|digits| digits.parse().ok())
                .ok_or_else(invalid)
        };
        let year = i32::try_from(field(0..4)?).map_err(|_| invalid())?;
        let base = Utc
            .with_ymd_and_hms(
                year,
                field(4..6)?,
                field(6..8)?,
                field(9..11)?,
                field(11..13)?,
                field(13..15)?,
            )
            .single()
            .ok_or_else(invalid)?;
        Ok(Self(base + Duration::milliseconds(i64::from(field(16..19)?))))
    }
}

impl TryFrom<String> for ManifestVersion {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ManifestVersion> for String {
    fn from(version: ManifestVersion) -> Self {
        version.to_string()
    }
}

/// Published metadata for one section's current bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Object key of the sprite
    pub file_name: String,
    /// Full content hash
    pub hash: ContentHash,
    /// Icon names contained in the sprite
    pub icons: Vec<String>,
    /// Uncompressed sprite size in bytes
    pub size: u64,
    /// When this bundle was first published
    pub deployed_at: DateTime<Utc>,
    /// Environment the bundle was published to
    pub environment: String,
}

impl ManifestEntry {
    /// Entry for a freshly compiled bundle
    #[must_use]
    pub fn for_bundle(bundle: &Bundle, deployed_at: DateTime<Utc>, environment: &str) -> Self {
        Self {
            file_name: bundle.file_name().to_string(),
            hash: *bundle.content_hash(),
            icons: bundle.icons().to_vec(),
            size: bundle.byte_size(),
            deployed_at,
            environment: environment.to_string(),
        }
    }

    /// Whether the sprite contains an icon
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.icons.iter().any(|icon| icon == name)
    }

    /// Symbol ids in the sprite
    #[must_use]
    pub fn symbol_ids(&self) -> Vec<String> {
        self.icons.iter().map(|name| symbol_id(name)).collect()
    }
}

/// The current section-to-bundle mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Monotonic version
    pub version: ManifestVersion,
    /// When this manifest was built
    pub last_update: DateTime<Utc>,
    /// Section key to entry
    #[serde(flatten)]
    pub sections: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Empty manifest
    #[must_use]
    pub fn new(version: ManifestVersion, last_update: DateTime<Utc>) -> Self {
        Self {
            version,
            last_update,
            sections: BTreeMap::new(),
        }
    }

    /// Entry for a section
    #[inline]
    #[must_use]
    pub fn entry(&self, section: &str) -> Option<&ManifestEntry> {
        self.sections.get(section)
    }

    /// Object keys of every referenced sprite
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.sections.values().map(|entry| entry.file_name.as_str())
    }

    /// Same section-to-bundle mapping, ignoring version and timestamps
    #[must_use]
    pub fn same_bundles(&self, other: &Manifest) -> bool {
        self.sections.len() == other.sections.len()
            && self.sections.iter().all(|(section, entry)| {
                other
                    .entry(section)
                    .is_some_and(|o| o.hash == entry.hash && o.file_name == entry.file_name)
            })
    }

    /// Serialize to pretty JSON bytes
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_json(&self) -> Result<Vec<u8>, ManifestError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse from JSON bytes
    ///
    /// # Errors
    /// Returns error if the payload is not a valid manifest
    pub fn from_json(bytes: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Tag-to-URL mapping maintained by an external content system
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagManifest {
    /// Opaque version assigned by the content system
    #[serde(default)]
    pub version: String,
    /// Last modification time
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    /// Category to (tag to URL)
    #[serde(default)]
    pub categories: BTreeMap<String, BTreeMap<String, String>>,
}

impl TagManifest {
    /// URL of the first candidate tag present in `category`
    #[must_use]
    pub fn lookup<S: AsRef<str>>(&self, category: &str, tags: &[S]) -> Option<&str> {
        let mapping = self.categories.get(category)?;
        tags.iter()
            .find_map(|tag| mapping.get(tag.as_ref()))
            .map(String::as_str)
    }

    /// True when no category carries any tag
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.categories.values().all(BTreeMap::is_empty)
    }
}

/// Manifest encoding errors
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// JSON encode/decode failure
    #[error("manifest serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Version string not in `YYYYMMDDTHHMMSS.mmmZ` form
    #[error("invalid manifest version: {0}")]
    InvalidVersion(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn instant(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).single().unwrap() + Duration::milliseconds(ms)
    }

    fn sample() -> Manifest {
        let bundle = Bundle::new("core", vec!["cart".into(), "user".into()], "<svg/>");
        let mut manifest = Manifest::new(ManifestVersion::at(instant(0)), instant(0));
        manifest.sections.insert(
            "core".into(),
            ManifestEntry::for_bundle(&bundle, instant(0), "production"),
        );
        manifest
    }

    #[test]
    fn version_display_is_fixed_width() {
        let version = ManifestVersion::at(instant(7));
        assert_eq!(version.to_string(), "20261016T120000.007Z");
    }

    #[test]
    fn version_parse_roundtrip() {
        let version = ManifestVersion::at(instant(123));
        let parsed: ManifestVersion = version.to_string().parse().unwrap();
        assert_eq!(version, parsed);
    }

    #[test]
    fn version_rejects_garbage() {
        assert!("v1".parse::<ManifestVersion>().is_err());
        assert!("2026101XT120000.000Z".parse::<ManifestVersion>().is_err());
    }

    #[test]
    fn next_after_is_strictly_increasing() {
        let prev = ManifestVersion::at(instant(500));
        let same_clock = ManifestVersion::next_after(Some(&prev), instant(500));
        let behind_clock = ManifestVersion::next_after(Some(&prev), instant(100));
        let ahead = ManifestVersion::next_after(Some(&prev), instant(900));

        assert!(same_clock > prev);
        assert!(behind_clock > prev);
        assert_eq!(ahead, ManifestVersion::at(instant(900)));
    }

    #[test]
    fn json_uses_flattened_camel_case_schema() {
        let json: serde_json::Value = serde_json::from_slice(&sample().to_json().unwrap()).unwrap();
        assert_eq!(json["version"], "20261016T120000.000Z");
        assert!(json["lastUpdate"].is_string());
        assert_eq!(json["core"]["icons"], serde_json::json!(["cart", "user"]));
        assert_eq!(json["core"]["environment"], "production");
        assert!(json["core"]["fileName"].as_str().unwrap().starts_with("sprite-core-"));
        assert_eq!(json["core"]["size"], 6);
    }

    #[test]
    fn json_roundtrip() {
        let manifest = sample();
        let decoded = Manifest::from_json(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(manifest, decoded);
    }

    #[test]
    fn entry_symbol_ids() {
        let manifest = sample();
        let entry = manifest.entry("core").unwrap();
        assert!(entry.contains("cart"));
        assert!(!entry.contains("heart"));
        assert_eq!(entry.symbol_ids(), vec!["icon-cart", "icon-user"]);
    }

    #[test]
    fn tag_lookup_takes_first_present_tag() {
        let json = r#"{
            "version": "7",
            "lastUpdate": "2026-10-16T12:00:00Z",
            "categories": {
                "hero": { "summer": "https://cdn/summer.svg", "default": "https://cdn/d.svg" }
            }
        }"#;
        let tags: TagManifest = serde_json::from_str(json).unwrap();

        assert_eq!(
            tags.lookup("hero", &["winter", "summer", "default"]),
            Some("https://cdn/summer.svg")
        );
        assert_eq!(tags.lookup("hero", &["winter"]), None);
        assert_eq!(tags.lookup("footer", &["summer"]), None);
        assert!(TagManifest::default().is_empty());
    }
}
