//! Shared, read-only inputs for one analysis run

use std::collections::BTreeMap;
use dagrefactor_core::{Config, ConfigError, IntermediateMatcher};
use dagrefactor_dbt::{DependencyGraph, ModelNode, Project};
use dagrefactor_sql::{
    normalize_sql, ColumnLineage, ColumnSet, ComponentParser, LineageAnalyzer, ParseError,
    SqlComponent, SqlFeatures,
};

/// Where parsed components come from. Implementations may memoize.
pub trait ComponentSource {
    fn components(&mut self, model_id: &str, sql: &str) -> Result<SqlComponent, ParseError>;

    fn output_columns(&mut self, model_id: &str, sql: &str) -> Result<ColumnSet, ParseError> {
        self.components(model_id, sql).map(|component| component.output_columns())
    }
}

/// Parses every model from scratch
#[derive(Debug, Default)]
pub struct FreshParse {
    parser: ComponentParser,
}

impl FreshParse {
    pub fn new(parser: ComponentParser) -> Self {
        Self { parser }
    }
}

impl ComponentSource for FreshParse {
    fn components(&mut self, _model_id: &str, sql: &str) -> Result<SqlComponent, ParseError> {
        self.parser.parse(sql)
    }
}

/// Per-model derived data
#[derive(Debug, Clone)]
struct ModelFacts {
    parsed: Result<ParsedModel, String>,
    normalized: String,
    features: SqlFeatures,
}

#[derive(Debug, Clone)]
struct ParsedModel {
    component: SqlComponent,
    lineage: ColumnLineage,
    output: ColumnSet,
}

/// Everything the detectors read. Built once, never mutated.
pub struct AnalysisContext<'a> {
    pub project: &'a Project,
    pub config: &'a Config,
    matcher: IntermediateMatcher,
    facts: BTreeMap<String, ModelFacts>,
}

impl<'a> AnalysisContext<'a> {
    /// Parse every analyzed model through `source`
    pub fn build(
        project: &'a Project,
        config: &'a Config,
        source: &mut dyn ComponentSource,
    ) -> Result<Self, ConfigError> {
        let matcher = config.naming.matcher()?;
        Ok(Self::with_matcher(project, config, matcher, source))
    }

    /// Same as `build` with an already compiled naming predicate
    pub fn with_matcher(
        project: &'a Project,
        config: &'a Config,
        matcher: IntermediateMatcher,
        source: &mut dyn ComponentSource,
    ) -> Self {
        let mut facts = BTreeMap::new();

        for model in project.models() {
            if config.allowlist.is_model_skipped(&model.unique_id)
                || config.allowlist.is_model_skipped(&model.name)
            {
                tracing::debug!(model = %model.unique_id, "skipped by allowlist");
                continue;
            }

            let parsed = source
                .components(&model.unique_id, &model.raw_sql)
                .and_then(|component| {
                    let output = source.output_columns(&model.unique_id, &model.raw_sql)?;
                    let lineage = LineageAnalyzer::analyze(&component);
                    Ok(ParsedModel { component, lineage, output })
                })
                .map_err(|err| {
                    tracing::warn!(model = %model.unique_id, error = %err, "failed to parse model SQL");
                    err.to_string()
                });

            let normalized = normalize_sql(&model.raw_sql);
            let features = SqlFeatures::from_normalized(&normalized);
            facts.insert(
                model.unique_id.clone(),
                ModelFacts { parsed, normalized, features },
            );
        }

        Self { project, config, matcher, facts }
    }

    pub fn graph(&self) -> &DependencyGraph {
        self.project.graph()
    }

    /// Models taking part in this run, ordered by unique_id
    pub fn models(&self) -> impl Iterator<Item = &'a ModelNode> + '_ {
        self.facts.keys().filter_map(|id| self.project.model(id))
    }

    pub fn is_analyzed(&self, model_id: &str) -> bool {
        self.facts.contains_key(model_id)
    }

    pub fn is_intermediate(&self, model_id: &str) -> bool {
        self.project.is_model(model_id) && self.matcher.matches(model_id)
    }

    pub fn component(&self, model_id: &str) -> Option<&SqlComponent> {
        self.parsed(model_id).map(|p| &p.component)
    }

    pub fn lineage(&self, model_id: &str) -> Option<&ColumnLineage> {
        self.parsed(model_id).map(|p| &p.lineage)
    }

    pub fn output_columns(&self, model_id: &str) -> Option<&ColumnSet> {
        self.parsed(model_id).map(|p| &p.output)
    }

    pub fn parse_failure(&self, model_id: &str) -> Option<&str> {
        match &self.facts.get(model_id)?.parsed {
            Err(reason) => Some(reason),
            Ok(_) => None,
        }
    }

    /// Failed models with their reasons
    pub fn parse_failures(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.facts.iter().filter_map(|(id, facts)| match &facts.parsed {
            Err(reason) => Some((id.as_str(), reason.as_str())),
            Ok(_) => None,
        })
    }

    pub fn normalized_sql(&self, model_id: &str) -> Option<&str> {
        self.facts.get(model_id).map(|f| f.normalized.as_str())
    }

    pub fn features(&self, model_id: &str) -> Option<&SqlFeatures> {
        self.facts.get(model_id).map(|f| &f.features)
    }

    /// Display name for messages
    pub fn display_name(&self, node_id: &str) -> String {
        self.project.reference_name(node_id)
    }

    fn parsed(&self, model_id: &str) -> Option<&ParsedModel> {
        self.facts.get(model_id)?.parsed.as_ref().ok()
    }
}
