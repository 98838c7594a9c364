//! Combinable-intermediate detection
//!
//! Two shapes are reported:
//! - an intermediate with exactly one child that is itself an intermediate
//! - a single-parent intermediate whose parent intermediate feeds at most two
//!   other models
//!
//! Each finding carries a feasibility verdict with the blockers found.

use std::collections::BTreeSet;
use dagrefactor_core::{Finding, FindingKind, MergePattern, Severity};
use crate::context::AnalysisContext;
use crate::detector::PatternDetector;

/// Other consumers a parent intermediate may have and still be merged
const MAX_OTHER_CONSUMERS: usize = 2;

pub struct CombinableIntermediateDetector;

impl CombinableIntermediateDetector {
    fn blockers(ctx: &AnalysisContext<'_>, left: &str, right: &str) -> Vec<String> {
        let mut blockers = Vec::new();

        let (left_component, right_component) = (ctx.component(left), ctx.component(right));
        for (id, component) in [(left, left_component), (right, right_component)] {
            if component.is_none() {
                blockers.push(format!("'{}' could not be parsed", ctx.display_name(id)));
            }
        }

        if let (Some(a), Some(b)) = (left_component, right_component) {
            let names: BTreeSet<&str> = a.cte_names().collect();
            let clashes: Vec<&str> = b.cte_names().filter(|name| names.contains(name)).collect();
            if !clashes.is_empty() {
                blockers.push(format!("CTE name collision: {}", clashes.join(", ")));
            }
        }

        let ranked = |id: &str| ctx.features(id).is_some_and(|f| f.uses_ranking);
        if ranked(left) && ranked(right) {
            blockers.push("both models use window or ranking functions".to_string());
        }

        blockers
    }

    fn finding(
        ctx: &AnalysisContext<'_>,
        model: &str,
        related: &str,
        pattern: MergePattern,
    ) -> Finding {
        let blockers = Self::blockers(ctx, model, related);
        let feasible = blockers.is_empty();
        let (model_name, related_name) = (ctx.display_name(model), ctx.display_name(related));

        let suggestion = match pattern {
            MergePattern::SingleChild => format!(
                "'{model_name}' is only consumed by '{related_name}'; consider merging it into '{related_name}'"
            ),
            MergePattern::SingleParent => format!(
                "'{model_name}' only reads '{related_name}'; consider combining the two intermediates"
            ),
        };

        let mut finding = Finding::new(
            FindingKind::CombinableIntermediate {
                model: model.to_string(),
                related: related.to_string(),
                pattern,
                feasible,
                blockers: blockers.clone(),
            },
            Severity::Info,
            suggestion,
        );
        for blocker in blockers {
            finding = finding.with_note(Severity::Warn, blocker);
        }
        finding
    }
}

impl PatternDetector for CombinableIntermediateDetector {
    fn name(&self) -> &'static str {
        "combinable_intermediate"
    }

    fn description(&self) -> &'static str {
        "Chains of intermediate models that could be merged"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>) -> Vec<Finding> {
        let graph = ctx.graph();
        let mut findings = Vec::new();
        let mut reported: BTreeSet<(String, String)> = BTreeSet::new();

        let intermediates: Vec<&str> = ctx
            .models()
            .map(|model| model.unique_id.as_str())
            .filter(|id| ctx.is_intermediate(id))
            .collect();

        for &id in &intermediates {
            let children = graph.children(id);
            if children.len() != 1 {
                continue;
            }
            let Some(&child) = children.first() else {
                continue;
            };
            if ctx.is_intermediate(child) {
                reported.insert(pair(id, child));
                findings.push(Self::finding(ctx, id, child, MergePattern::SingleChild));
            }
        }

        for &id in &intermediates {
            let parents = graph.parents(id);
            if parents.len() != 1 {
                continue;
            }
            let Some(&parent) = parents.first() else {
                continue;
            };
            if !ctx.is_intermediate(parent) {
                continue;
            }
            let other_consumers = graph.children(parent).len().saturating_sub(1);
            if other_consumers > MAX_OTHER_CONSUMERS || reported.contains(&pair(id, parent)) {
                continue;
            }
            reported.insert(pair(id, parent));
            findings.push(Self::finding(ctx, id, parent, MergePattern::SingleParent));
        }

        findings
    }
}

fn pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FreshParse;
    use crate::testing::project;
    use dagrefactor_core::Config;

    fn detect(models: &[(&str, &str)]) -> Vec<Finding> {
        let project = project(models);
        let config = Config::default();
        let ctx = AnalysisContext::build(&project, &config, &mut FreshParse::default()).unwrap();
        CombinableIntermediateDetector.detect(&ctx)
    }

    #[test]
    fn single_child_chain_is_reported_once() {
        let findings = detect(&[
            ("stg_orders", "select id, amount from {{ source('raw', 'orders') }}"),
            ("int_orders_cleaned", "select id, amount from {{ ref('stg_orders') }} where amount > 0"),
            ("int_orders_enriched", "select id, amount * 2 as doubled from {{ ref('int_orders_cleaned') }}"),
            ("fct_orders", "select * from {{ ref('int_orders_enriched') }}"),
        ]);

        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].kind,
            FindingKind::CombinableIntermediate {
                model: "model.shop.int_orders_cleaned".into(),
                related: "model.shop.int_orders_enriched".into(),
                pattern: MergePattern::SingleChild,
                feasible: true,
                blockers: vec![],
            }
        );
    }

    #[test]
    fn single_parent_with_few_consumers() {
        let findings = detect(&[
            ("stg_orders", "select id, amount from {{ source('raw', 'orders') }}"),
            ("int_orders", "select id, amount from {{ ref('stg_orders') }}"),
            ("int_orders_large", "select id from {{ ref('int_orders') }} where amount > 100"),
            ("fct_orders", "select * from {{ ref('int_orders') }}"),
            ("fct_large", "select * from {{ ref('int_orders_large') }}"),
        ]);

        assert_eq!(findings.len(), 1);
        assert!(matches!(
            &findings[0].kind,
            FindingKind::CombinableIntermediate { model, related, pattern: MergePattern::SingleParent, .. }
                if model == "model.shop.int_orders_large" && related == "model.shop.int_orders"
        ));
    }

    #[test]
    fn blockers_make_merge_infeasible() {
        let findings = detect(&[
            (
                "int_ranked",
                "with base as (select id, row_number() over (order by id) as rn from {{ source('raw', 'orders') }})
                 select * from base",
            ),
            (
                "int_top",
                "with base as (select id, rank() over (order by id) as r from {{ ref('int_ranked') }})
                 select * from base",
            ),
        ]);

        assert_eq!(findings.len(), 1);
        let FindingKind::CombinableIntermediate { feasible, blockers, .. } = &findings[0].kind else {
            panic!("unexpected finding kind");
        };
        assert!(!feasible);
        assert_eq!(blockers.len(), 2);
        assert!(blockers[0].starts_with("CTE name collision"));
    }
}
