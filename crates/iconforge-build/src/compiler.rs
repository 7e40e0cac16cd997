//! Sprite compilation
//!
//! Merges each section's icons into one sprite document. The merge order is
//! the icon name, never the order sources were discovered in, so identical
//! source sets always produce byte-identical sprites.

use iconforge_core::{Bundle, IconSource, Limits, SourceTree};
use rayon::prelude::*;

use crate::normalize::{normalize, NormalizeError};
use crate::validator::{bundle_size_warning, BuildWarning};

/// Opening tag of every sprite document.
pub const SPRITE_OPEN: &str = concat!(
    r#"<svg xmlns="http://www.w3.org/2000/svg" "#,
    r#"xmlns:xlink="http://www.w3.org/1999/xlink" style="display:none">"#
);

/// Closing tag of every sprite document.
pub const SPRITE_CLOSE: &str = "</svg>";

/// Result of compiling a whole source tree
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    /// One bundle per non-empty section, in section order
    pub bundles: Vec<Bundle>,
    /// Empty sections and over-budget bundles
    pub warnings: Vec<BuildWarning>,
}

/// Compilation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to compile {section}/{name}: {source}")]
pub struct CompileError {
    pub section: String,
    pub name: String,
    #[source]
    pub source: NormalizeError,
}

/// Section-parallel sprite compiler
#[derive(Debug, Clone, Copy, Default)]
pub struct SpriteCompiler {
    limits: Limits,
}

impl SpriteCompiler {
    /// Compiler checking bundles against `limits`
    #[inline]
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// Compile one section
    ///
    /// Returns `Ok(None)` for a section without icons.
    ///
    /// # Errors
    /// Returns [`CompileError`] if a source is not a well-formed SVG.
    pub fn compile_section(
        &self,
        section: &str,
        sources: &[IconSource],
    ) -> Result<Option<Bundle>, CompileError> {
        if sources.is_empty() {
            return Ok(None);
        }

        let mut ordered: Vec<&IconSource> = sources.iter().collect();
        ordered.sort_by(|a, b| a.name().cmp(b.name()));

        let mut document = String::from(SPRITE_OPEN);
        let mut icons = Vec::with_capacity(ordered.len());
        for source in ordered {
            let icon = normalize(source.raw_content()).map_err(|source_err| CompileError {
                section: section.to_string(),
                name: source.name().to_string(),
                source: source_err,
            })?;
            document.push('\n');
            document.push_str(&icon.to_symbol(&source.symbol_id()));
            icons.push(source.name().to_string());
        }
        document.push('\n');
        document.push_str(SPRITE_CLOSE);

        let bundle = Bundle::new(section, icons, document);
        tracing::debug!(
            section,
            file = bundle.file_name(),
            icons = bundle.icons().len(),
            bytes = bundle.byte_size(),
            "compiled sprite"
        );
        Ok(Some(bundle))
    }

    /// Compile every section in parallel
    ///
    /// Sections are independent; the join at the end is the only
    /// synchronization point before the manifest diff.
    ///
    /// # Errors
    /// Returns the first [`CompileError`] in section order.
    pub fn compile_tree(&self, tree: &SourceTree) -> Result<CompileOutput, CompileError> {
        let sections: Vec<(&str, &[IconSource])> = tree.sections().collect();
        let compiled: Vec<(String, Result<Option<Bundle>, CompileError>)> = sections
            .par_iter()
            .map(|(section, sources)| {
                ((*section).to_string(), self.compile_section(section, sources))
            })
            .collect();

        let mut output = CompileOutput::default();
        for (section, result) in compiled {
            match result? {
                Some(bundle) => {
                    if let Some(warning) = bundle_size_warning(&bundle, &self.limits) {
                        tracing::warn!(%warning, "sprite over size budget");
                        output.warnings.push(warning);
                    }
                    output.bundles.push(bundle);
                }
                None => {
                    tracing::warn!(section = %section, "section has no icons, skipping");
                    output.warnings.push(BuildWarning::EmptySection { section });
                }
            }
        }
        Ok(output)
    }
}
