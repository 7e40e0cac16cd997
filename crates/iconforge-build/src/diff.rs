//! Manifest diffing
//!
//! Compares freshly compiled bundles against the previously published
//! manifest. Sections whose hash did not change carry their old entry forward
//! untouched; the rest form the dirty set, which is the only thing the
//! distribution step uploads.

use chrono::{DateTime, Utc};
use iconforge_core::{Bundle, Manifest, ManifestEntry, ManifestVersion};

/// Candidate manifest plus what changed
#[derive(Debug, Clone)]
pub struct ManifestDiff {
    /// Manifest to publish once the dirty bundles are uploaded
    pub candidate: Manifest,
    /// Bundles whose section hash changed (or is new)
    pub dirty: Vec<Bundle>,
    /// Sections carried forward from the previous manifest
    pub unchanged: Vec<String>,
    /// Sections in the previous manifest with no compiled bundle
    pub removed: Vec<String>,
}

impl ManifestDiff {
    /// Whether the section-to-bundle mapping is identical to the previous one
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.dirty.is_empty() && self.removed.is_empty()
    }

    /// Sections in the dirty set
    pub fn dirty_sections(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(Bundle::section)
    }
}

/// Builds candidate manifests for one environment
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    environment: String,
}

impl ManifestBuilder {
    /// Builder stamping entries with `environment`
    #[must_use]
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    /// Diff `bundles` against `previous`
    ///
    /// The candidate version is strictly greater than the previous one even
    /// when `now` is not.
    #[must_use]
    pub fn build(
        &self,
        bundles: Vec<Bundle>,
        previous: Option<&Manifest>,
        now: DateTime<Utc>,
    ) -> ManifestDiff {
        let version = ManifestVersion::next_after(previous.map(|m| &m.version), now);
        let mut candidate = Manifest::new(version, version.timestamp());
        let mut dirty = Vec::new();
        let mut unchanged = Vec::new();

        for bundle in bundles {
            let section = bundle.section().to_string();
            match previous.and_then(|m| m.entry(&section)) {
                Some(entry) if entry.hash == *bundle.content_hash() => {
                    candidate.sections.insert(section.clone(), entry.clone());
                    unchanged.push(section);
                }
                _ => {
                    candidate.sections.insert(
                        section,
                        ManifestEntry::for_bundle(&bundle, version.timestamp(), &self.environment),
                    );
                    dirty.push(bundle);
                }
            }
        }

        let removed: Vec<String> = previous
            .map(|m| {
                m.sections
                    .keys()
                    .filter(|key| !candidate.sections.contains_key(*key))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        tracing::info!(
            version = %candidate.version,
            dirty = dirty.len(),
            unchanged = unchanged.len(),
            removed = removed.len(),
            "built candidate manifest"
        );

        ManifestDiff {
            candidate,
            dirty,
            unchanged,
            removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0).single().unwrap() + Duration::seconds(secs)
    }

    fn bundle(section: &str, body: &str) -> Bundle {
        Bundle::new(section, vec!["cart".into()], body.to_string())
    }

    #[test]
    fn first_build_marks_everything_dirty() {
        let diff = ManifestBuilder::new("production").build(
            vec![bundle("core", "a"), bundle("social", "b")],
            None,
            t(0),
        );
        assert_eq!(diff.dirty.len(), 2);
        assert!(diff.unchanged.is_empty());
        assert_eq!(diff.candidate.sections.len(), 2);
        assert_eq!(diff.candidate.entry("core").unwrap().environment, "production");
    }

    #[test]
    fn unchanged_sections_carry_forward() {
        let builder = ManifestBuilder::new("production");
        let first = builder.build(vec![bundle("core", "a"), bundle("social", "b")], None, t(0));
        let second = builder.build(
            vec![bundle("core", "a"), bundle("social", "b2")],
            Some(&first.candidate),
            t(60),
        );

        assert_eq!(second.dirty_sections().collect::<Vec<_>>(), vec!["social"]);
        assert_eq!(second.unchanged, vec!["core"]);
        assert_eq!(
            second.candidate.entry("core"),
            first.candidate.entry("core"),
            "carried entry keeps its original deployedAt"
        );
        assert!(second.candidate.version > first.candidate.version);
    }

    #[test]
    fn rerun_without_changes_is_noop_but_advances_version() {
        let builder = ManifestBuilder::new("production");
        let first = builder.build(vec![bundle("core", "a")], None, t(0));
        let second = builder.build(vec![bundle("core", "a")], Some(&first.candidate), t(0));

        assert!(second.is_noop());
        assert!(second.candidate.version > first.candidate.version);
        assert!(second.candidate.same_bundles(&first.candidate));
    }

    #[test]
    fn missing_sections_are_removed() {
        let builder = ManifestBuilder::new("production");
        let first = builder.build(vec![bundle("core", "a"), bundle("legacy", "z")], None, t(0));
        let second = builder.build(vec![bundle("core", "a")], Some(&first.candidate), t(5));

        assert_eq!(second.removed, vec!["legacy"]);
        assert!(second.candidate.entry("legacy").is_none());
        assert!(!second.is_noop());
    }
}
