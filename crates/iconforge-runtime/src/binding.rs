//! Use-site dispatch
//!
//! Every place an icon appears declares up front how it is delivered. The
//! dispatcher only routes the declared variant; it never guesses.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::resolver::{Resolution, ResolveError, RuntimeIconResolver};
use crate::tags::DynamicTagResolver;

/// How a use-site gets its icon, decided when the site is authored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconUse {
    /// Critical icon embedded in the page
    Inline { name: String },
    /// Non-critical icon from a section sprite
    Sprite { section: String, name: String },
    /// Content-managed asset picked by tag
    DynamicTag { category: String, tags: Vec<String> },
}

impl IconUse {
    #[must_use]
    pub fn inline(name: impl Into<String>) -> Self {
        Self::Inline { name: name.into() }
    }

    #[must_use]
    pub fn sprite(section: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Sprite {
            section: section.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn dynamic_tag<I, S>(category: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::DynamicTag {
            category: category.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }
}

/// What the presentation layer renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetResolution {
    /// Markup to embed directly
    Inline(String),
    /// URL (sprite fragment or image)
    Url(String),
    /// Nothing resolved; render the placeholder
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// An inline use-site names an icon with no embedded markup
    #[error("no inline markup registered for `{0}`")]
    MissingInline(String),
}

/// Routes each [`IconUse`] to its resolver
#[derive(Debug, Clone)]
pub struct IconDispatcher {
    icons: Arc<RuntimeIconResolver>,
    tags: Arc<DynamicTagResolver>,
    inline: BTreeMap<String, String>,
}

impl IconDispatcher {
    #[must_use]
    pub fn new(icons: Arc<RuntimeIconResolver>, tags: Arc<DynamicTagResolver>) -> Self {
        Self {
            icons,
            tags,
            inline: BTreeMap::new(),
        }
    }

    /// Register embedded markup for a critical icon
    #[must_use]
    pub fn with_inline(mut self, name: impl Into<String>, markup: impl Into<String>) -> Self {
        self.inline.insert(name.into(), markup.into());
        self
    }

    /// Resolve one use-site
    ///
    /// # Errors
    /// Returns [`DispatchError`] only for authoring mistakes: a sprite use of
    /// a critical icon, or an inline use without markup.
    pub async fn resolve(&self, usage: &IconUse) -> Result<AssetResolution, DispatchError> {
        match usage {
            IconUse::Inline { name } => self
                .inline
                .get(name)
                .map(|markup| AssetResolution::Inline(markup.clone()))
                .ok_or_else(|| DispatchError::MissingInline(name.clone())),
            IconUse::Sprite { section, name } => {
                Ok(match self.icons.resolve(section, name).await? {
                    Resolution::Sprite(sprite) => AssetResolution::Url(sprite.href()),
                    Resolution::NotFound => AssetResolution::Placeholder,
                })
            }
            IconUse::DynamicTag { category, tags } => Ok(self
                .tags
                .resolve(category, tags.as_slice())
                .await
                .map_or(AssetResolution::Placeholder, AssetResolution::Url)),
        }
    }
}
