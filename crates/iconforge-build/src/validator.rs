//! Source validation
//!
//! Runs every check over the whole tree and reports all violations at once.
//! Any violation is fatal for the run: the pipeline never hands a partially
//! valid tree to the compiler. Size budget overruns are only warnings.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use iconforge_core::{Bundle, CriticalIconRegistry, IconSource, Limits, SourceTree};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize::{normalize, NormalizeError};

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-z0-9-]+$").expect("name pattern is a valid regex"));

/// Section keys that would collide with top-level manifest fields.
const RESERVED_SECTIONS: &[&str] = &["version", "lastupdate"];

/// A fatal problem with the source tree
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A critical (inline-only) icon placed in a section tree
    #[error("{section}/{name}: `{name}` is a critical icon and must only be embedded inline")]
    ReservedName { section: String, name: String },

    /// Icon name breaks the naming rules
    #[error("{section}/{name}: invalid icon name ({reason})")]
    InvalidName {
        section: String,
        name: String,
        reason: String,
    },

    /// Section key breaks the naming rules
    #[error("{section}: invalid section name ({reason})")]
    InvalidSection { section: String, reason: String },

    /// Two sources in one section share a name
    #[error("{section}/{name}: duplicate icon name")]
    DuplicateName { section: String, name: String },

    /// Markup is not a single well-formed `<svg>`
    #[error("{section}/{name}: {source}")]
    MalformedSvg {
        section: String,
        name: String,
        #[source]
        source: NormalizeError,
    },
}

/// A non-fatal finding surfaced alongside a successful build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildWarning {
    /// A single source above the icon soft limit
    IconOverBudget {
        section: String,
        name: String,
        size: u64,
        limit: u64,
    },
    /// A compiled sprite above the bundle soft limit
    BundleOverBudget {
        section: String,
        size: u64,
        limit: u64,
    },
    /// A section directory without icons
    EmptySection { section: String },
}

impl Display for BuildWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::IconOverBudget {
                section,
                name,
                size,
                limit,
            } => write!(f, "{section}/{name} is {size} bytes (soft limit {limit})"),
            Self::BundleOverBudget {
                section,
                size,
                limit,
            } => write!(f, "sprite for {section} is {size} bytes (soft limit {limit})"),
            Self::EmptySection { section } => write!(f, "section {section} has no icons"),
        }
    }
}

/// Outcome of a clean validation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Number of sections checked
    pub sections: usize,
    /// Number of icons checked
    pub icons: usize,
    /// Size warnings
    pub warnings: Vec<BuildWarning>,
}

/// Every violation found in one pass
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("source validation failed with {} violation(s)", violations.len())]
pub struct ValidationFailure {
    /// Fatal violations, in section/name order
    pub violations: Vec<ValidationError>,
    /// Warnings collected during the same pass
    pub warnings: Vec<BuildWarning>,
}

/// Source tree validator
#[derive(Debug, Clone, Default)]
pub struct Validator {
    registry: CriticalIconRegistry,
    limits: Limits,
}

impl Validator {
    /// Create a validator for a registry and limits
    #[inline]
    #[must_use]
    pub fn new(registry: CriticalIconRegistry, limits: Limits) -> Self {
        Self { registry, limits }
    }

    /// Validate the full tree
    ///
    /// # Errors
    /// Returns [`ValidationFailure`] listing every fatal violation.
    pub fn validate(&self, tree: &SourceTree) -> Result<ValidationReport, ValidationFailure> {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();

        for (section, sources) in tree.sections() {
            if let Err(reason) = self.check_name(section) {
                violations.push(ValidationError::InvalidSection {
                    section: section.to_string(),
                    reason,
                });
            } else if RESERVED_SECTIONS.contains(&section.to_ascii_lowercase().as_str()) {
                violations.push(ValidationError::InvalidSection {
                    section: section.to_string(),
                    reason: "collides with a manifest field".to_string(),
                });
            }

            let mut seen = BTreeSet::new();
            for source in sources {
                self.check_source(source, &mut seen, &mut violations, &mut warnings);
            }
        }

        for warning in &warnings {
            tracing::warn!(%warning, "icon over size budget");
        }

        if violations.is_empty() {
            Ok(ValidationReport {
                sections: tree.section_count(),
                icons: tree.icon_count(),
                warnings,
            })
        } else {
            for violation in &violations {
                tracing::error!(%violation, "validation violation");
            }
            Err(ValidationFailure {
                violations,
                warnings,
            })
        }
    }

    fn check_source<'a>(
        &self,
        source: &'a IconSource,
        seen: &mut BTreeSet<&'a str>,
        violations: &mut Vec<ValidationError>,
        warnings: &mut Vec<BuildWarning>,
    ) {
        let section = source.section().to_string();
        let name = source.name();

        if self.registry.contains(name) {
            violations.push(ValidationError::ReservedName {
                section: section.clone(),
                name: name.to_string(),
            });
        }

        if let Err(reason) = self.check_name(name) {
            violations.push(ValidationError::InvalidName {
                section: section.clone(),
                name: name.to_string(),
                reason,
            });
        }

        if !seen.insert(name) {
            violations.push(ValidationError::DuplicateName {
                section: section.clone(),
                name: name.to_string(),
            });
        }

        if let Err(source_err) = normalize(source.raw_content()) {
            violations.push(ValidationError::MalformedSvg {
                section: section.clone(),
                name: name.to_string(),
                source: source_err,
            });
        }

        if source.byte_size() > self.limits.icon_soft_limit {
            warnings.push(BuildWarning::IconOverBudget {
                section,
                name: name.to_string(),
                size: source.byte_size(),
                limit: self.limits.icon_soft_limit,
            });
        }
    }

    fn check_name(&self, name: &str) -> Result<(), String> {
        if name.is_empty() {
            return Err("empty".to_string());
        }
        if name.len() > self.limits.max_name_len {
            return Err(format!(
                "{} characters, at most {} allowed",
                name.len(),
                self.limits.max_name_len
            ));
        }
        if !NAME_PATTERN.is_match(name) {
            return Err("must match [a-z0-9-]+".to_string());
        }
        Ok(())
    }
}

/// Warning for a compiled sprite above the bundle soft limit
#[must_use]
pub fn bundle_size_warning(bundle: &Bundle, limits: &Limits) -> Option<BuildWarning> {
    (bundle.byte_size() > limits.bundle_soft_limit).then(|| BuildWarning::BundleOverBudget {
        section: bundle.section().to_string(),
        size: bundle.byte_size(),
        limit: limits.bundle_soft_limit,
    })
}
