//! Rejoin detection
//!
//! M reads parent P and also a sibling S of P's children, where S exists only
//! to feed M. The S branch can usually fold into M. Confidence is high when
//! every column M reads from S is a column of P that S passes through and
//! P itself exposes.

use std::collections::BTreeSet;
use dagrefactor_core::{Confidence, Finding, FindingKind, Severity};
use crate::context::AnalysisContext;
use crate::detector::PatternDetector;
use crate::usage::{traces_to, used_columns};

pub struct RejoinDetector;

impl RejoinDetector {
    fn confidence(ctx: &AnalysisContext<'_>, model: &str, parent: &str, intermediate: &str) -> Confidence {
        let (Some(component), Some(lineage), Some(exposed), Some(sibling_lineage)) = (
            ctx.component(model),
            ctx.lineage(model),
            ctx.output_columns(parent),
            ctx.lineage(intermediate),
        ) else {
            return Confidence::Low;
        };

        let used = used_columns(component, lineage, &ctx.project.reference_name(intermediate));
        let parent_identifier = ctx.project.reference_name(parent);
        // S must hand P's column through unchanged for P to stand in for it
        let from_parent = used.iter().all(|column| {
            exposed.exposes(column) && traces_to(sibling_lineage, column, &parent_identifier)
        });
        if !used.is_empty() && from_parent {
            Confidence::High
        } else {
            Confidence::Low
        }
    }
}

impl PatternDetector for RejoinDetector {
    fn name(&self) -> &'static str {
        "rejoin"
    }

    fn description(&self) -> &'static str {
        "Single-consumer siblings that are re-joined with their own upstream"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>) -> Vec<Finding> {
        let graph = ctx.graph();
        let mut findings = Vec::new();

        for model in ctx.models() {
            let id = model.unique_id.as_str();
            let direct = graph.parents(id);
            let mut seen: BTreeSet<(&str, &str)> = BTreeSet::new();

            for parent in ctx.project.model_parents(id) {
                for &sibling in graph.children(parent).intersection(&direct) {
                    if sibling == id || !ctx.project.is_model(sibling) {
                        continue;
                    }
                    if graph.children(sibling) != BTreeSet::from([id]) {
                        continue;
                    }
                    if !seen.insert((parent, sibling)) {
                        continue;
                    }

                    let confidence = Self::confidence(ctx, id, parent, sibling);
                    let severity = match confidence {
                        Confidence::High => Severity::Warn,
                        Confidence::Low => Severity::Info,
                    };
                    let sibling_name = ctx.display_name(sibling);
                    let parent_name = ctx.display_name(parent);
                    findings.push(Finding::new(
                        FindingKind::RejoinPattern {
                            model: id.to_string(),
                            parent: parent.to_string(),
                            intermediate: sibling.to_string(),
                            confidence,
                        },
                        severity,
                        format!(
                            "'{sibling_name}' is only used by '{}' and re-joins '{parent_name}'; \
                             consider folding its logic into '{}'",
                            model.name, model.name
                        ),
                    ));
                }
            }
        }

        findings
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
        RejoinDetector.detect(&ctx)
    }

    #[test]
    fn flags_single_consumer_sibling() {
        let findings = detect(&[
            ("stg_orders", "select id, customer_id, amount from {{ source('raw', 'orders') }}"),
            ("int_order_totals", "select id, amount from {{ ref('stg_orders') }}"),
            (
                "fct_orders",
                "select o.id, o.customer_id, t.amount
                 from {{ ref('stg_orders') }} o join {{ ref('int_order_totals') }} t on t.id = o.id",
            ),
        ]);

        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].kind,
            FindingKind::RejoinPattern {
                model: "model.shop.fct_orders".into(),
                parent: "model.shop.stg_orders".into(),
                intermediate: "model.shop.int_order_totals".into(),
                confidence: Confidence::High,
            }
        );
    }

    #[test]
    fn derived_columns_lower_confidence() {
        let findings = detect(&[
            ("stg_orders", "select id, amount from {{ source('raw', 'orders') }}"),
            ("int_order_totals", "select id, sum(amount) as total from {{ ref('stg_orders') }} group by id"),
            (
                "fct_orders",
                "select o.id, t.total
                 from {{ ref('stg_orders') }} o join {{ ref('int_order_totals') }} t on t.id = o.id",
            ),
        ]);

        assert_eq!(findings.len(), 1);
        assert!(matches!(
            findings[0].kind,
            FindingKind::RejoinPattern { confidence: Confidence::Low, .. }
        ));
        assert_eq!(findings[0].severity, Severity::Info);
    }

    #[test]
    fn renamed_column_from_other_upstream_lowers_confidence() {
        let findings = detect(&[
            ("stg_orders", "select id, amount from {{ source('raw', 'orders') }}"),
            ("stg_refunds", "select order_id, amount from {{ source('raw', 'refunds') }}"),
            (
                "int_order_refunds",
                "select o.id, r.amount
                 from {{ ref('stg_orders') }} o join {{ ref('stg_refunds') }} r on r.order_id = o.id",
            ),
            (
                "fct_orders",
                "select o.id, t.amount
                 from {{ ref('stg_orders') }} o join {{ ref('int_order_refunds') }} t on t.id = o.id",
            ),
        ]);

        // int_order_refunds.amount is the refund amount, not stg_orders.amount
        let rejoin = findings
            .iter()
            .find(|f| matches!(&f.kind, FindingKind::RejoinPattern { parent, .. } if parent == "model.shop.stg_orders"))
            .unwrap();
        assert!(matches!(
            rejoin.kind,
            FindingKind::RejoinPattern { confidence: Confidence::Low, .. }
        ));
    }

    #[test]
    fn shared_sibling_is_not_flagged() {
        let findings = detect(&[
            ("stg_orders", "select id, amount from {{ source('raw', 'orders') }}"),
            ("int_order_totals", "select id, amount from {{ ref('stg_orders') }}"),
            (
                "fct_orders",
                "select o.id, t.amount
                 from {{ ref('stg_orders') }} o join {{ ref('int_order_totals') }} t on t.id = o.id",
            ),
            ("rpt_totals", "select id from {{ ref('int_order_totals') }}"),
        ]);

        assert!(findings.is_empty());
    }
}
