//! Analysis orchestrator
//!
//! Builds the shared context, scores every model, runs the detectors,
//! generates rewrites for redundant references and summarizes the result.

use dagrefactor_core::{
    AnalysisError, Config, ConfigError, Finding, FindingKind, IntermediateMatcher, ParseFailure,
    Report, RewriteArtifact, SkippedRewrite,
};
use dagrefactor_dbt::{Manifest, Project};
use crate::complexity::ComplexityScorer;
use crate::context::{AnalysisContext, ComponentSource};
use crate::detector::{default_detectors, PatternDetector};
use crate::recommendations::build_recommendations;
use crate::rewrite::{RefactoringGenerator, RewriteError};
use crate::usage::PassThrough;

/// Runs a full analysis over one project snapshot
pub struct Analyzer {
    config: Config,
    matcher: IntermediateMatcher,
    detectors: Vec<Box<dyn PatternDetector>>,
    generator: RefactoringGenerator,
}

impl Analyzer {
    /// Validate `config` and set up the built-in detectors
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let matcher = config.naming.matcher()?;
        let generator = RefactoringGenerator::new(&config.dialect);
        Ok(Self {
            config,
            matcher,
            detectors: default_detectors(),
            generator,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn detectors(&self) -> impl Iterator<Item = &dyn PatternDetector> {
        self.detectors.iter().map(|d| d.as_ref())
    }

    /// Load the project from a manifest, then analyze it
    pub fn analyze_manifest(
        &self,
        manifest: &Manifest,
        source: &mut dyn ComponentSource,
    ) -> Result<Report, AnalysisError> {
        let project = Project::from_manifest(manifest)?;
        Ok(self.analyze(&project, source))
    }

    /// Analyze an already-loaded project. Per-model failures are recorded in
    /// the report as data.
    pub fn analyze(&self, project: &Project, source: &mut dyn ComponentSource) -> Report {
        let ctx = AnalysisContext::with_matcher(project, &self.config, self.matcher.clone(), source);
        let mut report = Report::new();

        for (model, reason) in ctx.parse_failures() {
            report.parse_failures.push(ParseFailure {
                model: model.to_string(),
                reason: reason.to_string(),
            });
        }

        let scorer = ComplexityScorer::new(&self.config.complexity);
        for model in ctx.models() {
            report.add_metrics(scorer.score(&ctx, model));
        }

        for detector in &self.detectors {
            let span = tracing::info_span!("detector", name = detector.name());
            let _guard = span.enter();
            let findings = detector.detect(&ctx);
            tracing::info!(count = findings.len(), "detector finished");
            for finding in findings {
                report.add_finding(finding);
            }
        }

        if self.config.rewrite.enabled {
            let redundant: Vec<Finding> = report.redundant_references.clone();
            for finding in &redundant {
                match self.rewrite(&ctx, finding) {
                    Ok(artifact) => report.add_rewrite(artifact),
                    Err(RewriteError::Unrewritable { model, reason }) => {
                        tracing::debug!(%model, %reason, "finding left unrewritten");
                        report.skipped_rewrites.push(SkippedRewrite {
                            model,
                            grandparent: finding.related_model().unwrap_or_default().to_string(),
                            reason,
                        });
                    }
                }
            }
        }

        report.recommendations = build_recommendations(&report);
        tracing::info!(
            models = report.summary.models_analyzed,
            findings = report.findings().count(),
            rewrites = report.summary.rewrites,
            "analysis complete"
        );
        report
    }

    fn rewrite(
        &self,
        ctx: &AnalysisContext<'_>,
        finding: &Finding,
    ) -> Result<RewriteArtifact, RewriteError> {
        let FindingKind::RedundantReference { model, parent, grandparent } = &finding.kind else {
            return Err(RewriteError::Unrewritable {
                model: finding.model().to_string(),
                reason: "only redundant references can be rewritten".to_string(),
            });
        };
        let (Some(node), Some(component)) = (ctx.project.model(model), ctx.component(model)) else {
            return Err(RewriteError::Unrewritable {
                model: model.clone(),
                reason: "model SQL is not available".to_string(),
            });
        };

        let (Some(columns), Some(lineage)) = (ctx.output_columns(parent), ctx.lineage(parent)) else {
            return Err(RewriteError::Unrewritable {
                model: model.clone(),
                reason: "parent columns are not available".to_string(),
            });
        };

        self.generator.generate(
            node,
            component,
            &ctx.project.reference_name(parent),
            PassThrough { columns, lineage },
            &ctx.project.reference_name(grandparent),
        )
    }
}
