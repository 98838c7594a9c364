//! SQL refactoring for redundant references
//!
//! Given a model M that reads grandparent G directly while parent P already
//! exposes what it needs, produce M's SQL reading P instead:
//! CTEs that only read G are dropped, their readers are pointed at P, their
//! filters move into the main query and direct reads of G in the main query
//! are replaced or, for joins whose alias is otherwise unused or whose
//! columns can be read from P already in scope, removed.
//! Every column taken from G must reach M through P unchanged; otherwise the
//! finding is left unrewritten. The result is re-parsed and rejected if it
//! still depends on G.

use std::collections::BTreeSet;
use regex::Regex;
use sha2::{Digest, Sha256};
use dagrefactor_core::{AnalysisError, DialectConfig, RewriteArtifact};
use dagrefactor_dbt::ModelNode;
use dagrefactor_sql::{
    render_sql, scan_relations, ClauseKind, ColumnRef, ComponentParser, CteReference, DbtReference,
    RelationTarget, ScannedSql, SelectItem, SqlComponent,
};
use crate::usage::{query_refs, PassThrough};

/// Keywords that end a top-level WHERE clause
const WHERE_END: &[&str] = &["group by", "order by", "having", "qualify", "limit", "window"];

const SET_OPERATIONS: &[&str] = &["union", "intersect", "except"];

/// Direct reads of G replaced per query before giving up
const MAX_DIRECT_EDITS: usize = 64;

/// A finding that could not be turned into SQL
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewriteError {
    #[error("Cannot rewrite {model}: {reason}")]
    Unrewritable { model: String, reason: String },
}

impl From<RewriteError> for AnalysisError {
    fn from(err: RewriteError) -> Self {
        match err {
            RewriteError::Unrewritable { model, reason } => {
                AnalysisError::UnrewritableFinding { model, reason }
            }
        }
    }
}

/// Generates rewritten model SQL
#[derive(Debug, Default)]
pub struct RefactoringGenerator {
    parser: ComponentParser,
}

impl RefactoringGenerator {
    pub fn new(dialect: &DialectConfig) -> Self {
        Self {
            parser: ComponentParser::from_dialect(dialect),
        }
    }

    /// Rewrite `model` so it reads `parent` instead of `grandparent`.
    /// Both are dependency identifiers as they appear in the SQL; `through`
    /// describes the parent's output.
    pub fn generate(
        &self,
        model: &ModelNode,
        component: &SqlComponent,
        parent: &str,
        through: PassThrough<'_>,
        grandparent: &str,
    ) -> Result<RewriteArtifact, RewriteError> {
        let unrewritable = |reason: String| RewriteError::Unrewritable {
            model: model.unique_id.clone(),
            reason,
        };

        let mut removed: BTreeSet<&str> = BTreeSet::new();
        for cte in &component.ctes {
            if cte.is_constant || cte.dependencies.len() != 1 || !cte.dependencies.contains(grandparent) {
                continue;
            }
            if !cte.upstream_ctes.is_empty() {
                return Err(unrewritable(format!(
                    "CTE '{}' combines '{grandparent}' with other CTEs",
                    cte.name
                )));
            }
            removed.insert(&cte.name);
        }

        if let Some(mixed) = component
            .ctes
            .iter()
            .find(|cte| !removed.contains(cte.name.as_str()) && cte.dependencies.contains(grandparent))
        {
            return Err(unrewritable(format!(
                "CTE '{}' mixes '{grandparent}' with other dependencies",
                mixed.name
            )));
        }

        let direct_in_main = component.main.dependencies.contains(grandparent);
        if removed.is_empty() && !direct_in_main {
            return Err(unrewritable(format!("no removable reference to '{grandparent}'")));
        }

        for cte in component.ctes.iter().filter(|c| removed.contains(c.name.as_str())) {
            if let Some(column) = not_passed_through(cte, through, grandparent) {
                return Err(unrewritable(format!(
                    "column '{column}' of CTE '{}' is not available unchanged from '{parent}'",
                    cte.name
                )));
            }
        }
        if direct_in_main {
            let read = query_refs(&component.main, grandparent);
            if let Some(column) = through.first_missing(&read, grandparent) {
                return Err(unrewritable(format!(
                    "column '{column}' of '{grandparent}' is not available unchanged from '{parent}'"
                )));
            }
        }

        let replacement = DbtReference::Ref {
            package: None,
            model_name: parent.to_string(),
        }
        .render();
        let mut changes: Vec<String> = removed
            .iter()
            .map(|name| format!("Removed CTE '{name}' (reads only '{grandparent}')"))
            .collect();

        let mut ctes: Vec<(String, String)> = Vec::new();
        for cte in component.ctes.iter().filter(|c| !removed.contains(c.name.as_str())) {
            let (body, rewired) = rewire(&cte.body, &removed, &replacement);
            for name in rewired {
                changes.push(format!("Rewired '{name}' in CTE '{}' to {replacement}", cte.name));
            }
            ctes.push((cte.name.clone(), body));
        }

        let (mut main, rewired) = rewire(&component.main_query, &removed, &replacement);
        for name in rewired {
            changes.push(format!("Rewired '{name}' in the main query to {replacement}"));
        }

        let filters: Vec<&str> = component
            .ctes
            .iter()
            .filter(|cte| removed.contains(cte.name.as_str()))
            .flat_map(|cte| cte.filters.iter().map(String::as_str))
            .collect();
        if !filters.is_empty() {
            main = merge_filters(&main, &filters).map_err(unrewritable)?;
            changes.push(format!(
                "Merged {} filter predicate(s) into the main query WHERE clause",
                filters.len()
            ));
        }

        if direct_in_main {
            let (rewritten, edits) = replace_direct(&main, grandparent, parent, &replacement);
            main = rewritten;
            changes.extend(edits);
        }

        let comment = format!(
            "-- Refactored: removed redundant reference to '{grandparent}', now read through '{parent}'"
        );
        let preamble = match &component.preamble {
            Some(existing) => format!("{comment}\n{existing}"),
            None => comment,
        };
        let cte_pairs: Vec<(&str, &str)> = ctes.iter().map(|(n, b)| (n.as_str(), b.as_str())).collect();
        let rewritten_sql = render_sql(
            component.config_block.as_deref(),
            Some(&preamble),
            &cte_pairs,
            &main,
        );

        let reparsed = self
            .parser
            .parse(&rewritten_sql)
            .map_err(|err| unrewritable(format!("rewritten SQL failed to parse: {err}")))?;
        if reparsed.dependencies().contains(grandparent) {
            return Err(unrewritable(format!("rewritten SQL still depends on '{grandparent}'")));
        }

        tracing::debug!(model = %model.unique_id, changes = changes.len(), "generated rewrite");

        Ok(RewriteArtifact {
            model: model.unique_id.clone(),
            model_name: model.name.clone(),
            original_sql: model.raw_sql.clone(),
            rewritten_sql,
            changes,
            removed_reference: grandparent.to_string(),
            replacement: parent.to_string(),
            original_fingerprint: fingerprint(&model.raw_sql),
        })
    }
}

/// SHA-256 of the model text, hex encoded
pub fn fingerprint(sql: &str) -> String {
    hex::encode(Sha256::digest(sql.as_bytes()))
}

/// First column of a removed CTE that P cannot supply as-is: computed or
/// renamed select items, and any referenced column P does not carry from G
fn not_passed_through(cte: &CteReference, through: PassThrough<'_>, grandparent: &str) -> Option<String> {
    for item in &cte.select_items {
        match item {
            SelectItem::Wildcard { .. } => {
                if !through.carries("*", grandparent) {
                    return Some("*".to_string());
                }
            }
            SelectItem::Expression { expression, name, refs, .. } => {
                let plain = match refs.as_slice() {
                    [only] => only.column.eq_ignore_ascii_case(name) && is_bare_column(expression, only),
                    _ => false,
                };
                if !plain || !through.carries(name, grandparent) {
                    return Some(name.clone());
                }
            }
        }
    }
    cte.column_refs
        .iter()
        .find(|r| !through.carries(&r.column, grandparent))
        .map(|r| r.column.clone())
}

/// `col` or `qualifier.col` and nothing else
fn is_bare_column(expression: &str, column: &ColumnRef) -> bool {
    let compact: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
    match &column.qualifier {
        Some(qualifier) => {
            compact.eq_ignore_ascii_case(&format!("{qualifier}.{}", column.column))
                || compact.eq_ignore_ascii_case(&column.column)
        }
        None => compact.eq_ignore_ascii_case(&column.column),
    }
}

/// Point reads of removed CTEs at `replacement`, keeping the CTE name as alias
fn rewire(text: &str, removed: &BTreeSet<&str>, replacement: &str) -> (String, Vec<String>) {
    let mut edits: Vec<(std::ops::Range<usize>, String)> = Vec::new();
    let mut rewired = Vec::new();

    for found in scan_relations(text) {
        let RelationTarget::Table(name) = &found.relation.target else {
            continue;
        };
        if !removed.contains(name.as_str()) {
            continue;
        }
        let substitute = match found.alias_span {
            Some(_) => replacement.to_string(),
            None => format!("{replacement} {name}"),
        };
        edits.push((found.target_span.clone(), substitute));
        rewired.push(name.clone());
    }

    let mut out = text.to_string();
    edits.sort_by_key(|(span, _)| std::cmp::Reverse(span.start));
    for (span, substitute) in edits {
        out.replace_range(span, &substitute);
    }
    (out, rewired)
}

/// AND the predicates into the top-level WHERE clause, adding one if needed
fn merge_filters(query: &str, filters: &[&str]) -> Result<String, String> {
    let scan = ScannedSql::scan(query);
    let len = scan.len();
    if scan.find_any_keyword(0..len, SET_OPERATIONS, Some(0)).is_some() {
        return Err("filters cannot be merged into a query with a top-level set operation".to_string());
    }

    let predicate = filters
        .iter()
        .map(|f| format!("({})", f.trim()))
        .collect::<Vec<_>>()
        .join(" and ");

    let merged = match scan.find_keyword(0..len, "where", Some(0)) {
        Some(keyword) => {
            let end = scan
                .find_any_keyword(keyword.end..len, WHERE_END, Some(0))
                .map_or(len, |r| r.start);
            let existing = query[keyword.end..end].trim();
            format!(
                "{}where ({existing}) and {predicate}\n{}",
                &query[..keyword.start],
                &query[end..]
            )
        }
        None => {
            let at = scan
                .find_any_keyword(0..len, WHERE_END, Some(0))
                .map_or(len, |r| r.start);
            format!(
                "{}\nwhere {predicate}\n{}",
                query[..at].trim_end(),
                &query[at..]
            )
        }
    };
    Ok(merged.trim_end().to_string())
}

/// Replace or drop direct reads of `grandparent`. A join whose alias is still
/// used is dropped when `parent` is already joined at the top level, with its
/// columns re-qualified to the parent's alias.
fn replace_direct(query: &str, grandparent: &str, parent: &str, replacement: &str) -> (String, Vec<String>) {
    let mut text = query.to_string();
    let mut changes = Vec::new();

    for _ in 0..MAX_DIRECT_EDITS {
        let Some(found) = scan_relations(&text)
            .into_iter()
            .filter(|m| m.relation.reads_dependency(grandparent))
            .last()
        else {
            break;
        };

        let qualifier = found.relation.qualifier().to_string();
        if found.clause == ClauseKind::Join && found.depth == 0 {
            let without = format!("{}{}", &text[..found.clause_span.start], &text[found.clause_span.end..]);
            if !qualifier_used(&without, &qualifier) {
                text = without;
                changes.push(format!("Removed join to '{grandparent}' (alias '{qualifier}' unused)"));
                continue;
            }

            let in_scope = scan_relations(&without)
                .into_iter()
                .find(|m| m.depth == 0 && m.relation.reads_dependency(parent))
                .map(|m| m.relation.qualifier().to_string());
            if let Some(parent_alias) = in_scope.filter(|alias| !alias.eq_ignore_ascii_case(&qualifier)) {
                if let Some(requalified) = requalify(&without, &qualifier, &parent_alias) {
                    text = requalified;
                    changes.push(format!(
                        "Removed join to '{grandparent}'; columns of '{qualifier}' now read from '{parent_alias}'"
                    ));
                    continue;
                }
            }
        }

        text.replace_range(found.target_span.clone(), replacement);
        changes.push(format!("Replaced '{grandparent}' with {replacement} in the main query"));
    }

    (text, changes)
}

/// Whether `qualifier.` appears anywhere in code
fn qualifier_used(text: &str, qualifier: &str) -> bool {
    let Ok(pattern) = Regex::new(&format!(r"(?i)\b{}\s*\.", regex::escape(qualifier))) else {
        return true;
    };
    pattern.is_match(&ScannedSql::scan(text).masked())
}

/// Rename the `from.` qualifier to `to.` in code
fn requalify(text: &str, from: &str, to: &str) -> Option<String> {
    let pattern = Regex::new(&format!(r"(?i)\b{}\s*\.", regex::escape(from))).ok()?;
    let masked = ScannedSql::scan(text).masked();
    let starts: Vec<usize> = pattern
        .find_iter(&masked)
        .map(|m| m.start())
        .filter(|&start| start == 0 || masked.as_bytes()[start - 1] != b'.')
        .collect();

    let mut out = text.to_string();
    for start in starts.into_iter().rev() {
        out.replace_range(start..start + from.len(), to);
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagrefactor_dbt::ResourceKind;
    use dagrefactor_sql::LineageAnalyzer;
    use pretty_assertions::assert_eq;

    /// int_orders, carrying customer columns straight from stg_customers
    const INT_ORDERS: &str = "select c.id, c.name, c.is_active, o.customer_id, o.amount
from {{ ref('stg_orders') }} o
join {{ ref('stg_customers') }} c on c.id = o.customer_id";

    fn model(sql: &str) -> ModelNode {
        ModelNode {
            unique_id: "model.shop.fct_orders".into(),
            name: "fct_orders".into(),
            raw_sql: sql.into(),
            refs: vec![],
            sources: vec![],
            depends_on: vec![],
            resource_kind: ResourceKind::Model,
            original_file_path: "models/fct_orders.sql".into(),
        }
    }

    fn rewrite_through(sql: &str, parent_sql: &str) -> Result<RewriteArtifact, RewriteError> {
        let parser = ComponentParser::new();
        let parent = parser.parse(parent_sql).unwrap();
        let columns = parent.output_columns();
        let lineage = LineageAnalyzer::analyze(&parent);
        let through = PassThrough {
            columns: &columns,
            lineage: &lineage,
        };
        let component = parser.parse(sql).unwrap();
        RefactoringGenerator::default().generate(&model(sql), &component, "int_orders", through, "stg_customers")
    }

    fn rewrite(sql: &str) -> Result<RewriteArtifact, RewriteError> {
        rewrite_through(sql, INT_ORDERS)
    }

    #[test]
    fn removes_cte_and_rewires_reader() {
        let sql = "{{ config(materialized='table') }}
with customers as (
    select id, name from {{ ref('stg_customers') }} where is_active
),
orders as (
    select id, customer_id, amount from {{ ref('int_orders') }}
)
select o.id, o.amount, customers.name
from orders o
join customers on customers.id = o.customer_id";

        let artifact = rewrite(sql).unwrap();
        let out = &artifact.rewritten_sql;

        assert!(out.starts_with("{{ config(materialized='table') }}\n\n-- Refactored:"));
        assert!(!out.contains("ref('stg_customers')"));
        assert!(out.contains("join {{ ref('int_orders') }} customers on"));
        assert!(out.contains("where (is_active)"));
        assert_eq!(artifact.removed_reference, "stg_customers");
        assert_eq!(artifact.original_fingerprint.len(), 64);

        let reparsed = ComponentParser::new().parse(out).unwrap();
        assert_eq!(reparsed.cte_names().collect::<Vec<_>>(), vec!["orders"]);
        assert!(!reparsed.dependencies().contains("stg_customers"));
    }

    #[test]
    fn renamed_or_computed_cte_columns_are_unrewritable() {
        let renamed = "with customers as (
    select id as customer_key, name from {{ ref('stg_customers') }}
)
select o.id, customers.name
from {{ ref('int_orders') }} o
join customers on customers.customer_key = o.customer_id";
        let err = rewrite(renamed).unwrap_err();
        assert!(matches!(err, RewriteError::Unrewritable { ref reason, .. } if reason.contains("'customer_key'")));

        let computed = "with customers as (
    select id, upper(name) as name from {{ ref('stg_customers') }}
)
select o.id, customers.name
from {{ ref('int_orders') }} o
join customers on customers.id = o.customer_id";
        let err = rewrite(computed).unwrap_err();
        assert!(matches!(err, RewriteError::Unrewritable { ref reason, .. } if reason.contains("'name'")));
    }

    #[test]
    fn column_from_other_upstream_is_unrewritable() {
        // this parent's id is the order id
        let parent = "select o.id, o.customer_id, c.name
from {{ ref('stg_orders') }} o
join {{ ref('stg_customers') }} c on c.id = o.customer_id";
        let sql = "select i.amount, c.id as customer_key
from {{ ref('int_orders') }} i
join {{ ref('stg_customers') }} c on c.id = i.customer_id";

        let err = rewrite_through(sql, parent).unwrap_err();
        assert!(matches!(err, RewriteError::Unrewritable { ref reason, .. } if reason.contains("'id'")));
    }

    #[test]
    fn unused_join_is_dropped() {
        let sql = "select i.id, i.name
from {{ ref('int_orders') }} i
left join {{ ref('stg_customers') }} c on c.id = i.customer_id
where i.amount > 0";

        let artifact = rewrite(sql).unwrap();
        assert!(!artifact.rewritten_sql.contains("left join"));
        assert!(artifact.rewritten_sql.contains("where i.amount > 0"));
        assert!(artifact.changes[0].starts_with("Removed join"));
    }

    #[test]
    fn join_next_to_parent_is_folded_into_parent_alias() {
        let sql = "select i.id, c.name
from {{ ref('int_orders') }} i
join {{ ref('stg_customers') }} c on c.id = i.customer_id";

        let artifact = rewrite(sql).unwrap();
        let out = &artifact.rewritten_sql;
        assert!(out.contains("select i.id, i.name"));
        assert!(!out.contains("join"));
        assert_eq!(out.matches("ref('int_orders')").count(), 1);
        assert!(artifact.changes[0].contains("now read from 'i'"));
    }

    #[test]
    fn used_join_is_repointed() {
        let sql = "with orders as (select id, customer_id from {{ ref('int_orders') }})
select o.id, c.name
from orders o
join {{ ref('stg_customers') }} c on c.id = o.customer_id";

        let artifact = rewrite(sql).unwrap();
        assert!(artifact
            .rewritten_sql
            .contains("join {{ ref('int_orders') }} c on c.id = o.customer_id"));
    }

    #[test]
    fn set_operation_blocks_filter_merge() {
        let sql = "with c as (select id from {{ ref('stg_customers') }} where is_active)
select id from c
union all
select id from {{ ref('int_orders') }}";

        let err = rewrite(sql).unwrap_err();
        assert!(matches!(err, RewriteError::Unrewritable { ref reason, .. } if reason.contains("set operation")));
    }

    #[test]
    fn mixed_cte_is_unrewritable() {
        let sql = "with c as (
    select s.id from {{ ref('stg_customers') }} s join {{ ref('stg_orders') }} o on o.id = s.id
)
select * from c";

        let err = rewrite(sql).unwrap_err();
        assert!(matches!(err, RewriteError::Unrewritable { ref reason, .. } if reason.contains("mixes")));
    }

    #[test]
    fn merges_into_existing_where() {
        let merged = merge_filters("select * from t where a = 1 order by a", &["b = 2"]).unwrap();
        assert_eq!(merged, "select * from t where (a = 1) and (b = 2)\norder by a");
    }

    #[test]
    fn synthesizes_where() {
        let merged = merge_filters("select * from t group by a", &["b = 2", "c"]).unwrap();
        assert_eq!(merged, "select * from t\nwhere (b = 2) and (c)\ngroup by a");
    }
}
