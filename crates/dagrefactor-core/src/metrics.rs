//! Per-model complexity metrics

use serde::{Deserialize, Serialize};
use crate::finding::{Note, Severity};

/// Structural metrics and derived complexity score for one model
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComplexityMetrics {
    /// Model unique_id
    pub model: String,

    pub num_joins: usize,
    pub num_ctes: usize,
    pub num_refs: usize,
    pub num_sources: usize,
    pub num_children: usize,
    pub num_parents: usize,

    /// Length of the raw SQL in characters
    pub sql_length: usize,

    pub num_window_functions: usize,
    pub num_aggregations: usize,
    pub num_case_statements: usize,
    pub num_filters: usize,

    /// Weighted score clamped to [0, 100]
    pub complexity_score: f64,

    /// Any complexity trip-wire fired
    pub is_complex: bool,

    /// The model's SQL could not be parsed; all counts are zero
    pub parse_failed: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
}

impl ComplexityMetrics {
    /// Zero-valued row for a model whose SQL failed to parse
    pub fn parse_failure(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            parse_failed: true,
            notes: vec![Note::new(Severity::Error, reason)],
            ..Self::default()
        }
    }
}
