//! Authored icon sources
//!
//! An [`IconSource`] is one vector icon as written by an author. A
//! [`SourceTree`] groups them by section; sections are kept in a `BTreeMap`
//! so nothing downstream ever depends on filesystem iteration order.
//!
//! On disk the tree looks like `<root>/<section>/**/<name>.svg`. Files that
//! sit directly under the root, or that are not `.svg`, are ignored.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Prefix applied to an icon name to form its symbol id inside a sprite.
pub const SYMBOL_PREFIX: &str = "icon-";

/// Symbol id for an icon name (`cart` → `icon-cart`)
#[inline]
#[must_use]
pub fn symbol_id(name: &str) -> String {
    format!("{SYMBOL_PREFIX}{name}")
}

/// A single authored vector icon
///
/// Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconSource {
    section: String,
    name: String,
    raw_content: String,
    byte_size: u64,
    origin: Option<PathBuf>,
}

impl IconSource {
    /// Create a source from in-memory markup
    #[must_use]
    pub fn new(
        section: impl Into<String>,
        name: impl Into<String>,
        raw_content: impl Into<String>,
    ) -> Self {
        let raw_content = raw_content.into();
        Self {
            section: section.into(),
            name: name.into(),
            byte_size: raw_content.len() as u64,
            raw_content,
            origin: None,
        }
    }

    /// Record the path this source was read from
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<PathBuf>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Section (category key)
    #[inline]
    #[must_use]
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Icon name, unique within its section
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw vector markup
    #[inline]
    #[must_use]
    pub fn raw_content(&self) -> &str {
        &self.raw_content
    }

    /// Size of the raw markup in bytes
    #[inline]
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// Path relative to the source root, when loaded from disk
    #[inline]
    #[must_use]
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// Symbol id this icon gets inside its sprite
    #[inline]
    #[must_use]
    pub fn symbol_id(&self) -> String {
        symbol_id(&self.name)
    }
}

/// Icon sources grouped by section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTree {
    sections: BTreeMap<String, Vec<IconSource>>,
}

impl SourceTree {
    /// Create an empty tree
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a section even if it ends up holding no icons
    pub fn ensure_section(&mut self, section: impl Into<String>) {
        self.sections.entry(section.into()).or_default();
    }

    /// Add a source under its own section
    pub fn insert(&mut self, source: IconSource) {
        self.sections
            .entry(source.section().to_string())
            .or_default()
            .push(source);
    }

    /// Builder-style insert
    #[must_use]
    pub fn with(mut self, source: IconSource) -> Self {
        self.insert(source);
        self
    }

    /// Sources of one section
    #[must_use]
    pub fn section(&self, section: &str) -> Option<&[IconSource]> {
        self.sections.get(section).map(Vec::as_slice)
    }

    /// All sections in key order
    pub fn sections(&self) -> impl Iterator<Item = (&str, &[IconSource])> {
        self.sections
            .iter()
            .map(|(key, sources)| (key.as_str(), sources.as_slice()))
    }

    /// Every source across all sections
    pub fn iter(&self) -> impl Iterator<Item = &IconSource> {
        self.sections.values().flatten()
    }

    /// Number of sections (including empty ones)
    #[inline]
    #[must_use]
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Total number of sources
    #[must_use]
    pub fn icon_count(&self) -> usize {
        self.sections.values().map(Vec::len).sum()
    }

    /// True when no sections are registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Load `<root>/<section>/**/*.svg`
    ///
    /// Every first-level directory becomes a section, including empty ones.
    /// Icons in nested directories belong to the top-level section they sit
    /// under; their name is the file stem.
    ///
    /// # Errors
    /// Returns [`SourceError`] if the root is missing, a directory cannot be
    /// walked, or a file cannot be read as UTF-8.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, SourceError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(SourceError::MissingRoot(root.to_path_buf()));
        }

        let mut tree = Self::new();
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_path_buf();
            let mut components = relative.components();
            let Some(section) = components.next().and_then(|c| c.as_os_str().to_str()) else {
                continue;
            };

            if entry.file_type().is_dir() {
                if entry.depth() == 1 {
                    tree.ensure_section(section);
                }
                continue;
            }

            if entry.depth() == 1 {
                tracing::debug!(path = %relative.display(), "ignoring file outside any section");
                continue;
            }

            let is_svg = entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
            if !is_svg {
                tracing::debug!(path = %relative.display(), "ignoring non-svg file");
                continue;
            }

            let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) else {
                return Err(SourceError::NonUtf8Path(relative));
            };

            let raw = std::fs::read_to_string(entry.path()).map_err(|source| SourceError::Read {
                path: relative.clone(),
                source,
            })?;

            tree.insert(IconSource::new(section, name, raw).with_origin(relative));
        }

        tracing::debug!(
            sections = tree.section_count(),
            icons = tree.icon_count(),
            root = %root.display(),
            "loaded icon sources"
        );
        Ok(tree)
    }
}

impl FromIterator<IconSource> for SourceTree {
    fn from_iter<I: IntoIterator<Item = IconSource>>(iter: I) -> Self {
        let mut tree = Self::new();
        for source in iter {
            tree.insert(source);
        }
        tree
    }
}

/// Errors raised while loading sources from disk
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Source root does not exist or is not a directory
    #[error("source root not found: {0}")]
    MissingRoot(PathBuf),

    /// Directory walk failed
    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// File could not be read (includes invalid UTF-8)
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Path is not valid UTF-8
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),
}
