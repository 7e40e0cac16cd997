//! Iconforge Runtime
//!
//! Client-side half of the system. Icons reach a page one of three ways:
//!
//! ```text
//! IconUse::Inline      → embedded markup (critical icons, no network)
//! IconUse::Sprite      → RuntimeIconResolver → manifest → sprite#icon-{name}
//! IconUse::DynamicTag  → DynamicTagResolver  → tag manifest → URL
//! ```
//!
//! None of the network paths surface errors to the page: a failed fetch
//! becomes a placeholder.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod binding;
pub mod loaded;
pub mod resolver;
pub mod source;
pub mod tags;

pub use binding::{AssetResolution, DispatchError, IconDispatcher, IconUse};
pub use loaded::LoadedSections;
pub use resolver::{Resolution, ResolveError, RuntimeIconResolver, SpriteRef};
pub use source::{AssetSource, FetchError, HttpAssetSource, DEFAULT_FETCH_TIMEOUT};
pub use tags::DynamicTagResolver;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
