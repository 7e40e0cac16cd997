//! Compiled sprite bundles
//!
//! A [`Bundle`] is the immutable output of compiling one section. Its file
//! name is derived from the content hash, so a source change always yields a
//! new bundle rather than a mutated one.

use bytes::Bytes;

use crate::hash::ContentHash;
use crate::source::symbol_id;

/// Content type of every sprite object.
pub const SVG_CONTENT_TYPE: &str = "image/svg+xml";

/// `sprite-{section}-{hash8}.svg`
#[must_use]
pub fn bundle_file_name(section: &str, hash: &ContentHash) -> String {
    format!("sprite-{section}-{}.svg", hash.short())
}

/// The compiled sprite for one section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    section: String,
    content_hash: ContentHash,
    file_name: String,
    icons: Vec<String>,
    symbol_ids: Vec<String>,
    content: Bytes,
}

impl Bundle {
    /// Seal normalized sprite content
    ///
    /// `icons` must be in the same order the symbols appear in `content`.
    #[must_use]
    pub fn new(section: impl Into<String>, icons: Vec<String>, content: impl Into<Bytes>) -> Self {
        let section = section.into();
        let content = content.into();
        let content_hash = ContentHash::compute(&content);
        Self {
            file_name: bundle_file_name(&section, &content_hash),
            symbol_ids: icons.iter().map(|name| symbol_id(name)).collect(),
            section,
            content_hash,
            icons,
            content,
        }
    }

    /// Section key
    #[inline]
    #[must_use]
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Digest of the normalized content
    #[inline]
    #[must_use]
    pub fn content_hash(&self) -> &ContentHash {
        &self.content_hash
    }

    /// Published object key
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Icon names, sorted
    #[inline]
    #[must_use]
    pub fn icons(&self) -> &[String] {
        &self.icons
    }

    /// `icon-{name}` per included icon
    #[inline]
    #[must_use]
    pub fn symbol_ids(&self) -> &[String] {
        &self.symbol_ids
    }

    /// Normalized sprite document
    #[inline]
    #[must_use]
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Size of the uncompressed sprite
    #[inline]
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.content.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_embeds_short_hash() {
        let bundle = Bundle::new("core", vec!["cart".into()], "<svg/>");
        let expected = format!("sprite-core-{}.svg", bundle.content_hash().short());
        assert_eq!(bundle.file_name(), expected);
    }

    #[test]
    fn symbol_ids_follow_icons() {
        let bundle = Bundle::new("core", vec!["cart".into(), "user".into()], "<svg/>");
        assert_eq!(bundle.symbol_ids(), ["icon-cart", "icon-user"]);
        assert_eq!(bundle.byte_size(), 6);
    }

    #[test]
    fn same_content_same_identity() {
        let a = Bundle::new("core", vec!["cart".into()], "<svg>a</svg>");
        let b = Bundle::new("core", vec!["cart".into()], "<svg>a</svg>");
        let c = Bundle::new("core", vec!["cart".into()], "<svg>b</svg>");
        assert_eq!(a.file_name(), b.file_name());
        assert_ne!(a.content_hash(), c.content_hash());
    }
}
