//! Similar-model detection
//!
//! Models are bucketed by a cheap structural signature so only plausible
//! pairs are compared. Each pair gets a weighted score over normalized text
//! similarity, dependency overlap and structural agreement.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use dagrefactor_core::{Finding, FindingKind, Severity, SimilarityComponents, SimilarityWeights};
use dagrefactor_sql::SqlFeatures;
use crate::context::AnalysisContext;
use crate::detector::PatternDetector;

pub struct SimilarityDetector;

/// What one model contributes to pair scoring
struct Profile<'a> {
    id: &'a str,
    normalized: &'a str,
    refs: BTreeSet<&'a str>,
    sources: BTreeSet<&'a str>,
    features: &'a SqlFeatures,
}

impl Profile<'_> {
    /// Pairs are only compared inside one bucket
    fn bucket(&self) -> (usize, usize, usize, bool, bool) {
        (
            self.refs.len(),
            self.sources.len(),
            self.features.joins,
            self.features.has_group_by(),
            self.features.has_window(),
        )
    }
}

/// |a ∩ b| / |a ∪ b|; two empty sets are identical
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Mean agreement over the structural feature counts
pub fn structure_similarity(a: &SqlFeatures, b: &SqlFeatures) -> f64 {
    let pairs = [
        (a.joins, b.joins),
        (a.group_bys, b.group_bys),
        (a.window_functions, b.window_functions),
        (a.ctes, b.ctes),
        (a.unions, b.unions),
    ];
    let total: f64 = pairs
        .iter()
        .map(|&(x, y)| {
            let max = x.max(y);
            if max == 0 {
                1.0
            } else {
                x.min(y) as f64 / max as f64
            }
        })
        .sum();
    total / pairs.len() as f64
}

fn score(a: &Profile<'_>, b: &Profile<'_>, weights: &SimilarityWeights) -> (f64, SimilarityComponents) {
    let components = SimilarityComponents {
        text: strsim::normalized_levenshtein(a.normalized, b.normalized),
        refs: jaccard(&a.refs, &b.refs),
        sources: jaccard(&a.sources, &b.sources),
        structure: structure_similarity(a.features, b.features),
    };
    let total = components.text * weights.text
        + components.refs * weights.refs
        + components.sources * weights.sources
        + components.structure * weights.structure;
    (total, components)
}

impl PatternDetector for SimilarityDetector {
    fn name(&self) -> &'static str {
        "similarity"
    }

    fn description(&self) -> &'static str {
        "Pairs of models with near-identical logic"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>) -> Vec<Finding> {
        let settings = &ctx.config.similarity;
        let mut buckets: BTreeMap<_, Vec<Profile<'_>>> = BTreeMap::new();

        for model in ctx.models() {
            let (Some(normalized), Some(features)) =
                (ctx.normalized_sql(&model.unique_id), ctx.features(&model.unique_id))
            else {
                continue;
            };
            let profile = Profile {
                id: &model.unique_id,
                normalized,
                refs: model.refs.iter().map(String::as_str).collect(),
                sources: model.sources.iter().map(String::as_str).collect(),
                features,
            };
            buckets.entry(profile.bucket()).or_default().push(profile);
        }

        let mut scored = Vec::new();
        for (bucket, profiles) in &buckets {
            tracing::trace!(?bucket, size = profiles.len(), "comparing bucket");
            for (i, left) in profiles.iter().enumerate() {
                for right in &profiles[i + 1..] {
                    let (total, components) = score(left, right, &settings.weights);
                    if total >= settings.threshold {
                        let (model1, model2) = if left.id <= right.id {
                            (left.id, right.id)
                        } else {
                            (right.id, left.id)
                        };
                        scored.push((model1, model2, total, components));
                    }
                }
            }
        }

        scored.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
                .then_with(|| a.1.cmp(b.1))
        });

        scored
            .into_iter()
            .map(|(model1, model2, total, components)| {
                Finding::new(
                    FindingKind::SimilarPair {
                        model1: model1.to_string(),
                        model2: model2.to_string(),
                        score: total,
                        components,
                    },
                    Severity::Info,
                    format!(
                        "'{}' and '{}' are {:.0}% similar; consider consolidating the shared logic",
                        ctx.display_name(model1),
                        ctx.display_name(model2),
                        total * 100.0
                    ),
                )
            })
            .collect()
    }
}
