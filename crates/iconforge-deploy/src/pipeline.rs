//! End-to-end build and deploy orchestration

use chrono::Utc;
use iconforge_build::{
    BuildWarning, CompileError, ManifestBuilder, SpriteCompiler, ValidationFailure,
    ValidationReport, Validator,
};
use iconforge_core::{observability::pipeline_span, Bundle, PipelineConfig, SourceError, SourceTree};
use tracing::Instrument;

use crate::distribution::DistributionEngine;
use crate::error::DeployError;
use crate::record::DeploymentRecord;

/// Pipeline failure
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to load icon sources: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Validation(#[from] ValidationFailure),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("deploy failed: {0}")]
    Deploy(#[from] DeployError),
}

/// Compiled bundles plus everything worth reporting
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub report: ValidationReport,
    pub bundles: Vec<Bundle>,
    /// Icon and bundle size warnings plus empty sections
    pub warnings: Vec<BuildWarning>,
}

/// Validate, compile, diff and distribute
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    validator: Validator,
    compiler: SpriteCompiler,
    builder: ManifestBuilder,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            validator: Validator::new(config.critical_icons.clone(), config.limits),
            compiler: SpriteCompiler::new(config.limits),
            builder: ManifestBuilder::new(config.environment.clone()),
            config,
        }
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the configured source directory
    ///
    /// # Errors
    /// Returns [`PipelineError::Source`] if the tree cannot be read
    pub fn load(&self) -> Result<SourceTree, PipelineError> {
        Ok(SourceTree::load(&self.config.source_dir)?)
    }

    /// Validate and compile `tree`
    ///
    /// # Errors
    /// Returns [`PipelineError::Validation`] with every violation before any
    /// compilation starts.
    pub fn build_tree(&self, tree: &SourceTree) -> Result<BuildOutput, PipelineError> {
        let report = self.validator.validate(tree)?;
        let compiled = self.compiler.compile_tree(tree)?;

        let mut warnings = report.warnings.clone();
        warnings.extend(compiled.warnings);
        tracing::info!(
            sections = report.sections,
            icons = report.icons,
            bundles = compiled.bundles.len(),
            warnings = warnings.len(),
            "build complete"
        );
        Ok(BuildOutput {
            report,
            bundles: compiled.bundles,
            warnings,
        })
    }

    /// Load, validate and compile the configured source directory
    ///
    /// # Errors
    /// See [`Pipeline::load`] and [`Pipeline::build_tree`]
    pub fn build(&self) -> Result<BuildOutput, PipelineError> {
        let tree = self.load()?;
        self.build_tree(&tree)
    }

    /// Build `tree` and publish it through `engine`
    ///
    /// Nothing is read from or written to the store unless validation and
    /// compilation succeed.
    ///
    /// # Errors
    /// Returns [`PipelineError`] from whichever stage failed
    pub async fn deploy_tree(
        &self,
        tree: &SourceTree,
        engine: &DistributionEngine,
    ) -> Result<DeploymentRecord, PipelineError> {
        let span = pipeline_span("deploy", &self.config.environment);
        let run = async {
            let output = self.build_tree(tree)?;
            let previous = engine.current_manifest().await.map_err(DeployError::from)?;
            let diff = self
                .builder
                .build(output.bundles, previous.as_ref(), Utc::now());
            Ok::<_, PipelineError>(engine.deploy(&diff).await?)
        };
        run.instrument(span).await
    }

    /// Load the configured source directory and publish it
    ///
    /// # Errors
    /// Returns [`PipelineError`] from whichever stage failed
    pub async fn deploy(&self, engine: &DistributionEngine) -> Result<DeploymentRecord, PipelineError> {
        let tree = self.load()?;
        self.deploy_tree(&tree, engine).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::NoopEdgeCache;
    use crate::store::MemoryStore;
    use iconforge_core::IconSource;
    use std::sync::Arc;

    const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24"><path d="M0 0h24"/></svg>"#;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
            .with_environment("production")
            .with_critical_icons(["logo"])
    }

    #[test]
    fn build_collects_validation_and_compile_warnings() {
        let mut tree: SourceTree = [IconSource::new("core", "cart", SVG)].into_iter().collect();
        tree.ensure_section("empty");

        let output = Pipeline::new(config()).build_tree(&tree).unwrap();
        assert_eq!(output.bundles.len(), 1);
        assert_eq!(
            output.warnings,
            vec![BuildWarning::EmptySection {
                section: "empty".into()
            }]
        );
    }

    #[tokio::test]
    async fn reserved_name_aborts_before_store_access() {
        let store = Arc::new(MemoryStore::new());
        let engine = DistributionEngine::new(store.clone(), Arc::new(NoopEdgeCache), &config());
        let tree: SourceTree = [
            IconSource::new("core", "cart", SVG),
            IconSource::new("core", "logo", SVG),
        ]
        .into_iter()
        .collect();

        let err = Pipeline::new(config())
            .deploy_tree(&tree, &engine)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert!(store.keys().is_empty());
        assert!(engine.log().is_empty());
    }

    #[test]
    fn missing_source_dir_is_a_source_error() {
        let pipeline = Pipeline::new(config().with_source_dir("/nonexistent/iconforge"));
        assert!(matches!(pipeline.build(), Err(PipelineError::Source(_))));
    }
}
