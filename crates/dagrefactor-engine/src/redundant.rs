//! Redundant-reference detection
//!
//! A model M that reads a grandparent G directly, while one of its parents P
//! already reads G, is redundant when P carries every column of G that M
//! uses: same name, with lineage back to that column of G. At most one
//! finding is reported per (M, G).

use std::collections::{BTreeMap, BTreeSet};
use dagrefactor_core::{Finding, FindingKind, Severity};
use crate::context::AnalysisContext;
use crate::detector::PatternDetector;
use crate::usage::{referenced_columns, used_columns, PassThrough};

pub struct RedundantReferenceDetector;

/// Chosen parent for one grandparent
struct Candidate<'a> {
    parent: &'a str,
    overlap: usize,
    used: BTreeSet<String>,
}

impl PatternDetector for RedundantReferenceDetector {
    fn name(&self) -> &'static str {
        "redundant_reference"
    }

    fn description(&self) -> &'static str {
        "Direct references to a grandparent already available through a parent"
    }

    fn detect(&self, ctx: &AnalysisContext<'_>) -> Vec<Finding> {
        let graph = ctx.graph();
        let mut findings = Vec::new();

        for model in ctx.models() {
            let id = model.unique_id.as_str();
            let Some(component) = ctx.component(id) else {
                continue;
            };
            let Some(lineage) = ctx.lineage(id) else {
                continue;
            };
            let direct = graph.parents(id);
            let model_columns = referenced_columns(component);
            let mut chosen: BTreeMap<&str, Candidate<'_>> = BTreeMap::new();

            for parent in ctx.project.model_parents(id) {
                // an unparseable or skipped parent gives no column guarantee
                let (Some(exposed), Some(parent_lineage)) = (ctx.output_columns(parent), ctx.lineage(parent))
                else {
                    continue;
                };
                let through_parent = PassThrough {
                    columns: exposed,
                    lineage: parent_lineage,
                };

                for &grandparent in graph.parents(parent).intersection(&direct) {
                    let identifier = ctx.project.reference_name(grandparent);
                    let used = used_columns(component, lineage, &identifier);
                    if let Some(column) = through_parent.first_missing(&used, &identifier) {
                        tracing::debug!(
                            model = id,
                            parent,
                            grandparent,
                            column = %column,
                            "parent does not carry a used column"
                        );
                        continue;
                    }

                    let overlap = model_columns.intersection(&exposed.names).count();
                    let better = match chosen.get(grandparent) {
                        None => true,
                        Some(current) => {
                            overlap > current.overlap
                                || (overlap == current.overlap && parent < current.parent)
                        }
                    };
                    if better {
                        chosen.insert(grandparent, Candidate { parent, overlap, used });
                    }
                }
            }

            for (grandparent, candidate) in chosen {
                let grandparent_name = ctx.display_name(grandparent);
                let parent_name = ctx.display_name(candidate.parent);
                let mut finding = Finding::new(
                    FindingKind::RedundantReference {
                        model: id.to_string(),
                        parent: candidate.parent.to_string(),
                        grandparent: grandparent.to_string(),
                    },
                    Severity::Warn,
                    format!(
                        "Remove the direct reference to '{grandparent_name}' from '{}'; \
                         its columns are available through '{parent_name}'",
                        model.name
                    ),
                );
                if !candidate.used.is_empty() {
                    let columns: Vec<&str> = candidate.used.iter().map(String::as_str).collect();
                    finding = finding.with_note(
                        Severity::Info,
                        format!("Columns read from '{grandparent_name}': {}", columns.join(", ")),
                    );
                }
                findings.push(finding);
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

    #[test]
    fn flags_grandparent_exposed_by_parent() {
        let project = project(&[
            ("stg_customers", "select id, name, region from {{ source('raw', 'customers') }}"),
            (
                "int_orders",
                "select o.id, o.amount, c.name, c.region
                 from {{ ref('stg_orders') }} o join {{ ref('stg_customers') }} c on c.id = o.customer_id",
            ),
            ("stg_orders", "select id, amount, customer_id from {{ source('raw', 'orders') }}"),
            (
                "fct_orders",
                "select i.id, i.amount, c.name
                 from {{ ref('int_orders') }} i join {{ ref('stg_customers') }} c on c.name = i.name",
            ),
        ]);
        let config = Config::default();
        let ctx = AnalysisContext::build(&project, &config, &mut FreshParse::default()).unwrap();

        let findings = RedundantReferenceDetector.detect(&ctx);
        assert_eq!(findings.len(), 1);
        assert_eq!(
            findings[0].kind,
            FindingKind::RedundantReference {
                model: "model.shop.fct_orders".into(),
                parent: "model.shop.int_orders".into(),
                grandparent: "model.shop.stg_customers".into(),
            }
        );
    }

    #[test]
    fn column_missing_from_parent_blocks_finding() {
        let project = project(&[
            ("stg_customers", "select id, name, email from {{ source('raw', 'customers') }}"),
            ("int_customers", "select id, name from {{ ref('stg_customers') }}"),
            (
                "dim_customers",
                "select i.id, s.email
                 from {{ ref('int_customers') }} i join {{ ref('stg_customers') }} s on s.id = i.id",
            ),
        ]);
        let config = Config::default();
        let ctx = AnalysisContext::build(&project, &config, &mut FreshParse::default()).unwrap();

        assert!(RedundantReferenceDetector.detect(&ctx).is_empty());
    }

    #[test]
    fn same_named_column_from_another_upstream_blocks_finding() {
        let project = project(&[
            ("stg_customers", "select id, name from {{ source('raw', 'customers') }}"),
            ("stg_orders", "select id, customer_id, amount from {{ source('raw', 'orders') }}"),
            (
                "int_orders",
                "select o.id, o.customer_id, o.amount
                 from {{ ref('stg_orders') }} o join {{ ref('stg_customers') }} c on c.id = o.customer_id",
            ),
            (
                "fct_orders",
                "select i.id as order_id, i.amount, c.id as customer_key
                 from {{ ref('int_orders') }} i join {{ ref('stg_customers') }} c on c.id = i.customer_id",
            ),
        ]);
        let config = Config::default();
        let ctx = AnalysisContext::build(&project, &config, &mut FreshParse::default()).unwrap();

        // int_orders.id is the order id, not stg_customers.id
        assert!(RedundantReferenceDetector.detect(&ctx).is_empty());
    }

    #[test]
    fn grandparent_not_read_by_parent_is_never_flagged() {
        let project = project(&[
            ("stg_customers", "select id, name from {{ source('raw', 'customers') }}"),
            ("stg_orders", "select id, customer_id, amount from {{ source('raw', 'orders') }}"),
            ("int_orders", "select id, customer_id, amount from {{ ref('stg_orders') }}"),
            (
                "fct_orders",
                "select i.id, i.amount, c.name
                 from {{ ref('int_orders') }} i join {{ ref('stg_customers') }} c on c.id = i.customer_id",
            ),
        ]);
        let config = Config::default();
        let ctx = AnalysisContext::build(&project, &config, &mut FreshParse::default()).unwrap();

        assert!(!ctx.graph().parents("model.shop.int_orders").contains("model.shop.stg_customers"));
        assert!(RedundantReferenceDetector.detect(&ctx).is_empty());
    }

    #[test]
    fn unparseable_parent_is_not_trusted() {
        let project = project(&[
            ("stg_customers", "select id from {{ source('raw', 'customers') }}"),
            ("int_customers", "{{ ref('stg_customers') }} -- macro only"),
            (
                "dim_customers",
                "select i.id from {{ ref('int_customers') }} i join {{ ref('stg_customers') }} s on s.id = i.id",
            ),
        ]);
        let config = Config::default();
        let ctx = AnalysisContext::build(&project, &config, &mut FreshParse::default()).unwrap();

        assert!(ctx.parse_failure("model.shop.int_customers").is_some());
        assert!(RedundantReferenceDetector.detect(&ctx).is_empty());
    }
}
