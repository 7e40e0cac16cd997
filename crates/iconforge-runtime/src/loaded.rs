//! Sections whose sprite has been fetched this session

use dashmap::DashSet;

/// Session-scoped set of prefetched sections
///
/// Owned by whoever owns the session and handed to resolvers, so tests and
/// logouts can reset it with [`LoadedSections::clear`]. A claim is never
/// given back, so each section costs at most one fetch per session.
#[derive(Debug, Default)]
pub struct LoadedSections {
    sections: DashSet<String>,
}

impl LoadedSections {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `section`; returns `true` only for the first caller
    pub fn claim(&self, section: &str) -> bool {
        self.sections.insert(section.to_string())
    }

    #[must_use]
    pub fn is_loaded(&self, section: &str) -> bool {
        self.sections.contains(section)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Forget every section
    ///
    /// The only way to retry a section, including one whose fetch failed.
    pub fn clear(&self) {
        self.sections.clear();
    }
}
