//! Iconforge Build
//!
//! The pure, CPU-bound half of the pipeline:
//!
//! ```text
//! SourceTree → Validator → SpriteCompiler → ManifestBuilder → ManifestDiff
//!                 │              │ (rayon, per section)
//!                 └─ fail-closed └─ deterministic, name-ordered
//! ```
//!
//! Nothing in this crate touches storage; a failed validation therefore has
//! no side effects by construction.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod compiler;
pub mod diff;
pub mod normalize;
pub mod validator;

pub use compiler::{CompileError, CompileOutput, SpriteCompiler, SPRITE_CLOSE, SPRITE_OPEN};
pub use diff::{ManifestBuilder, ManifestDiff};
pub use normalize::{normalize, NormalizeError, NormalizedIcon};
pub use validator::{
    bundle_size_warning, BuildWarning, ValidationError, ValidationFailure, ValidationReport,
    Validator,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
