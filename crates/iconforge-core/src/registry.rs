//! Reserved critical icon names
//!
//! Critical icons are embedded directly at authoring time and must never be
//! compiled into a sprite or resolved at run time.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Fixed set of names reserved for inline-only icons
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CriticalIconRegistry {
    names: BTreeSet<String>,
}

impl CriticalIconRegistry {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a name is reserved
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Reserved names in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Number of reserved names
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when nothing is reserved
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for CriticalIconRegistry {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_membership() {
        let registry: CriticalIconRegistry = ["logo", "menu", "logo"].into_iter().collect();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("logo"));
        assert!(!registry.contains("cart"));
        assert_eq!(registry.iter().collect::<Vec<_>>(), vec!["logo", "menu"]);
    }

    #[test]
    fn registry_deserializes_from_list() {
        let registry: CriticalIconRegistry = serde_json::from_str(r#"["search","logo"]"#).unwrap();
        assert!(registry.contains("search"));
        assert!(!registry.is_empty());
    }
}
