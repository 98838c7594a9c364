//! Per-model complexity scoring

use dagrefactor_core::{ComplexityConfig, ComplexityMetrics, Note, Severity};
use dagrefactor_dbt::ModelNode;
use dagrefactor_sql::SqlFeatures;
use crate::context::AnalysisContext;

/// Scores models against the configured weights and trip-wires
pub struct ComplexityScorer<'c> {
    config: &'c ComplexityConfig,
}

impl<'c> ComplexityScorer<'c> {
    pub fn new(config: &'c ComplexityConfig) -> Self {
        Self { config }
    }

    /// Metrics row for one model; unparseable models get the zero row
    pub fn score(&self, ctx: &AnalysisContext<'_>, model: &ModelNode) -> ComplexityMetrics {
        let id = model.unique_id.as_str();
        if let Some(reason) = ctx.parse_failure(id) {
            return ComplexityMetrics::parse_failure(id, reason);
        }

        let features = ctx
            .features(id)
            .copied()
            .unwrap_or_else(|| SqlFeatures::from_sql(&model.raw_sql));
        let graph = ctx.graph();

        let mut metrics = ComplexityMetrics {
            model: id.to_string(),
            num_joins: features.joins,
            num_ctes: ctx.component(id).map_or(features.ctes, |c| c.ctes.len()),
            num_refs: model.refs.len(),
            num_sources: model.sources.len(),
            num_children: graph.children(id).len(),
            num_parents: graph.parents(id).len(),
            sql_length: model.raw_sql.chars().count(),
            num_window_functions: features.window_functions,
            num_aggregations: features.aggregations,
            num_case_statements: features.case_statements,
            num_filters: features.filters,
            ..ComplexityMetrics::default()
        };
        self.apply(&mut metrics);
        metrics
    }

    /// Fill in the score, the verdict and the trip-wire notes
    pub fn apply(&self, metrics: &mut ComplexityMetrics) {
        let w = &self.config.weights;
        let weighted = metrics.num_joins as f64 * w.joins
            + metrics.num_window_functions as f64 * w.window_functions
            + metrics.num_ctes as f64 * w.ctes
            + metrics.num_aggregations as f64 * w.aggregations
            + (metrics.num_refs + metrics.num_sources) as f64 * w.dependencies
            + metrics.num_case_statements as f64 * w.case_statements
            + metrics.num_filters as f64 * w.filters;
        metrics.complexity_score = (weighted * self.config.scale).clamp(0.0, 100.0);

        let mut tripped = Vec::new();
        if metrics.complexity_score > self.config.score_threshold {
            tripped.push(format!(
                "score {:.1} exceeds {:.1}",
                metrics.complexity_score, self.config.score_threshold
            ));
        }
        if metrics.num_joins > self.config.max_joins {
            tripped.push(format!("{} joins exceed {}", metrics.num_joins, self.config.max_joins));
        }
        if metrics.sql_length > self.config.max_sql_length {
            tripped.push(format!(
                "{} characters exceed {}",
                metrics.sql_length, self.config.max_sql_length
            ));
        }

        metrics.is_complex = !tripped.is_empty();
        metrics
            .notes
            .extend(tripped.into_iter().map(|reason| Note::new(Severity::Warn, reason)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FreshParse;
    use crate::testing::project;
    use dagrefactor_core::Config;

    #[test]
    fn many_joins_trip_the_wire() {
        let joins: String = (1..=6)
            .map(|i| format!(" join {{{{ ref('dim_{i}') }}}} d{i} on d{i}.id = f.id"))
            .collect();
        let sql = format!("select f.id from {{{{ ref('facts') }}}} f{joins}");
        let mut models = vec![("wide".to_string(), sql), ("facts".to_string(), "select 1 as id".to_string())];
        for i in 1..=6 {
            models.push((format!("dim_{i}"), "select 1 as id".to_string()));
        }
        let pairs: Vec<(&str, &str)> = models.iter().map(|(n, s)| (n.as_str(), s.as_str())).collect();
        let project = project(&pairs);
        let config = Config::default();
        let ctx = AnalysisContext::build(&project, &config, &mut FreshParse::default()).unwrap();

        let wide = project.resolve("wide").unwrap();
        let metrics = ComplexityScorer::new(&config.complexity).score(&ctx, wide);

        assert_eq!(metrics.num_joins, 6);
        assert_eq!(metrics.num_refs, 7);
        assert_eq!(metrics.num_parents, 7);
        assert!(metrics.sql_length < config.complexity.max_sql_length);
        assert!(metrics.is_complex);
        assert!(metrics.notes.iter().any(|n| n.message.contains("6 joins exceed 5")));
    }

    #[test]
    fn score_is_clamped() {
        let config = ComplexityConfig::default();
        let mut metrics = ComplexityMetrics {
            model: "model.shop.huge".into(),
            num_window_functions: 100,
            ..ComplexityMetrics::default()
        };
        ComplexityScorer::new(&config).apply(&mut metrics);
        assert_eq!(metrics.complexity_score, 100.0);
        assert!(metrics.is_complex);
    }

    #[test]
    fn simple_model_is_not_complex() {
        let config = ComplexityConfig::default();
        let mut metrics = ComplexityMetrics {
            model: "model.shop.simple".into(),
            num_refs: 1,
            num_filters: 1,
            sql_length: 80,
            ..ComplexityMetrics::default()
        };
        ComplexityScorer::new(&config).apply(&mut metrics);
        assert_eq!(metrics.complexity_score, 3.0);
        assert!(!metrics.is_complex);
        assert!(metrics.notes.is_empty());
    }
}
