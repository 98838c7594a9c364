//! Which columns of an upstream relation a model actually reads

use std::collections::BTreeSet;
use dagrefactor_sql::{ColumnLineage, ColumnSet, QueryParts, Relation, SqlComponent, MAIN_QUERY};

/// Columns of the dependency `identifier` used by a parsed model.
///
/// Union of lineage provenance, every column reference in a query that reads
/// only `identifier`, and references qualified by its alias elsewhere.
pub fn used_columns(component: &SqlComponent, lineage: &ColumnLineage, identifier: &str) -> BTreeSet<String> {
    let mut used = lineage.columns_from(identifier);

    for cte in &component.ctes {
        if cte.reads_only(identifier) {
            used.extend(cte.column_refs.iter().map(|r| r.column.clone()));
        } else {
            used.extend(qualified_refs(&cte.relations, &cte.column_refs, identifier));
        }
    }
    used.extend(query_refs(&component.main, identifier));

    used
}

/// Columns a single query reads from `identifier`: all of them when it reads
/// nothing else, otherwise those qualified by its alias
pub fn query_refs(query: &QueryParts, identifier: &str) -> BTreeSet<String> {
    let reads_only = query.dependencies.len() == 1
        && query.dependencies.contains(identifier)
        && query.upstream_ctes.is_empty();
    if reads_only {
        return query.column_refs.iter().map(|r| r.column.clone()).collect();
    }
    qualified_refs(&query.relations, &query.column_refs, identifier)
}

fn qualified_refs(
    relations: &[Relation],
    column_refs: &[dagrefactor_sql::ColumnRef],
    identifier: &str,
) -> BTreeSet<String> {
    let qualifiers: BTreeSet<&str> = relations
        .iter()
        .filter(|rel| rel.reads_dependency(identifier))
        .map(Relation::qualifier)
        .collect();

    column_refs
        .iter()
        .filter(|r| r.qualifier.as_deref().is_some_and(|q| qualifiers.contains(q)))
        .map(|r| r.column.clone())
        .collect()
}

/// Whether the main query of a model exposes `column` derived from
/// `upstream.column`, directly or through a wildcard over `upstream`
pub fn traces_to(lineage: &ColumnLineage, column: &str, upstream: &str) -> bool {
    let wildcard = format!("{upstream}.*");
    match lineage.sources_of(&format!("{MAIN_QUERY}.{column}")) {
        Some(sources) => sources.contains(&format!("{upstream}.{column}")) || sources.contains(&wildcard),
        None => lineage
            .sources_of(&format!("{MAIN_QUERY}.*"))
            .is_some_and(|sources| sources.contains(&wildcard)),
    }
}

/// A model's output as a stand-in for one of its own dependencies
#[derive(Debug, Clone, Copy)]
pub struct PassThrough<'a> {
    pub columns: &'a ColumnSet,
    pub lineage: &'a ColumnLineage,
}

impl PassThrough<'_> {
    /// `column` is exposed under the same name and comes from `upstream`
    pub fn carries(&self, column: &str, upstream: &str) -> bool {
        self.columns.exposes(column) && traces_to(self.lineage, column, upstream)
    }

    /// First column of `columns` not carried from `upstream`
    pub fn first_missing<'c>(
        &self,
        columns: impl IntoIterator<Item = &'c String>,
        upstream: &str,
    ) -> Option<&'c String> {
        columns.into_iter().find(|c| !self.carries(c, upstream))
    }
}

/// Every column name referenced anywhere in the model
pub fn referenced_columns(component: &SqlComponent) -> BTreeSet<String> {
    component
        .ctes
        .iter()
        .flat_map(|cte| cte.column_refs.iter())
        .chain(component.main.column_refs.iter())
        .map(|r| r.column.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagrefactor_sql::{ComponentParser, LineageAnalyzer};
    use pretty_assertions::assert_eq;

    #[test]
    fn collects_from_all_paths() {
        let component = ComponentParser::new()
            .parse(
                "with customers as (select id, name from {{ ref('stg_customers') }} where is_active)
                 select o.id, c.name, s.region
                 from {{ ref('int_orders') }} o
                 join customers c on c.id = o.customer_id
                 join {{ ref('stg_customers') }} s on s.id = o.customer_id",
            )
            .unwrap();
        let lineage = LineageAnalyzer::analyze(&component);
        let used = used_columns(&component, &lineage, "stg_customers");

        let expected: BTreeSet<String> = ["id", "is_active", "name", "region"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(used, expected);
    }

    #[test]
    fn traces_only_through_matching_provenance() {
        let component = ComponentParser::new()
            .parse(
                "select o.id, o.customer_id, c.name
                 from {{ ref('stg_orders') }} o
                 join {{ ref('stg_customers') }} c on c.id = o.customer_id",
            )
            .unwrap();
        let lineage = LineageAnalyzer::analyze(&component);

        assert!(traces_to(&lineage, "name", "stg_customers"));
        assert!(traces_to(&lineage, "id", "stg_orders"));
        assert!(!traces_to(&lineage, "id", "stg_customers"));
        assert!(!traces_to(&lineage, "region", "stg_customers"));
    }

    #[test]
    fn wildcard_traces_to_its_relation() {
        let component = ComponentParser::new()
            .parse("select * from {{ ref('stg_customers') }}")
            .unwrap();
        let lineage = LineageAnalyzer::analyze(&component);
        let columns = component.output_columns();
        let view = PassThrough { columns: &columns, lineage: &lineage };

        assert!(view.carries("region", "stg_customers"));
        assert!(!view.carries("region", "stg_orders"));
    }
}
