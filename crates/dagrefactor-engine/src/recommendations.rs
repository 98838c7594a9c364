//! Aggregated advisory rows for the report

use std::collections::BTreeSet;
use dagrefactor_core::{FindingKind, Recommendation, RecommendationKind, Report};

/// Reference count above which a model is worth splitting
const MAX_REFS: usize = 5;

/// Summarize a finished report into recommendation rows
pub fn build_recommendations(report: &Report) -> Vec<Recommendation> {
    let mut out = Vec::new();

    let complex: Vec<String> = report
        .complexity
        .iter()
        .filter(|m| m.is_complex || m.num_refs > MAX_REFS)
        .map(|m| m.model.clone())
        .collect();
    if !complex.is_empty() {
        out.push(Recommendation {
            kind: RecommendationKind::Complexity,
            models: complex,
            model_pairs: Vec::new(),
            suggestion: "Consider breaking these models into smaller, more focused intermediate models"
                .to_string(),
        });
    }

    let redundant: BTreeSet<String> = report
        .redundant_references
        .iter()
        .map(|f| f.model().to_string())
        .collect();
    if !redundant.is_empty() {
        out.push(Recommendation {
            kind: RecommendationKind::RedundantReferences,
            models: redundant.into_iter().collect(),
            model_pairs: Vec::new(),
            suggestion: "Remove direct references to upstream models that are already available through a parent"
                .to_string(),
        });
    }

    let rejoins: BTreeSet<String> = report
        .rejoin_patterns
        .iter()
        .map(|f| f.model().to_string())
        .collect();
    if !rejoins.is_empty() {
        out.push(Recommendation {
            kind: RecommendationKind::RejoinPatterns,
            models: rejoins.into_iter().collect(),
            model_pairs: Vec::new(),
            suggestion: "Fold single-use intermediate branches back into the models that re-join them"
                .to_string(),
        });
    }

    let combinable: Vec<(String, String)> = report
        .combinable_intermediates
        .iter()
        .filter_map(|f| match &f.kind {
            FindingKind::CombinableIntermediate { model, related, .. } => {
                Some((model.clone(), related.clone()))
            }
            _ => None,
        })
        .collect();
    if !combinable.is_empty() {
        out.push(Recommendation {
            kind: RecommendationKind::CombinableIntermediates,
            models: Vec::new(),
            model_pairs: combinable,
            suggestion: "Merge chained intermediate models to reduce DAG depth".to_string(),
        });
    }

    let similar: Vec<(String, String)> = report
        .similar_pairs
        .iter()
        .filter_map(|f| match &f.kind {
            FindingKind::SimilarPair { model1, model2, .. } => Some((model1.clone(), model2.clone())),
            _ => None,
        })
        .collect();
    if !similar.is_empty() {
        out.push(Recommendation {
            kind: RecommendationKind::SimilarLogic,
            models: Vec::new(),
            model_pairs: similar,
            suggestion: "Consolidate near-duplicate models into a shared model or macro".to_string(),
        });
    }

    out
}
