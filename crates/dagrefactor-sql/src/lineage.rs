//! Column-level lineage within a single model
//!
//! For every CTE (and the main query) maps each output column to the
//! columns of external relations (refs, sources, raw tables) it is derived
//! from, following intermediate CTEs transitively.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use serde::Serialize;
use crate::components::{SelectItem, SqlComponent};
use crate::relations::{Relation, RelationTarget};
use crate::tokens::ColumnRef;

/// Label used for the main query's columns
pub const MAIN_QUERY: &str = "<main>";

/// Output column -> provenance columns of one query
pub type QueryLineage = BTreeMap<String, BTreeSet<String>>;

/// `"query.column" -> {"relation.column"}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnLineage {
    pub edges: BTreeMap<String, BTreeSet<String>>,
}

impl ColumnLineage {
    pub fn sources_of(&self, column: &str) -> Option<&BTreeSet<String>> {
        self.edges.get(column)
    }

    /// Columns of `relation` that any query in the model derives from
    /// (`*` when a wildcard over it propagates)
    pub fn columns_from(&self, relation: &str) -> BTreeSet<String> {
        let prefix = format!("{relation}.");
        self.edges
            .values()
            .flatten()
            .filter_map(|source| source.strip_prefix(&prefix))
            .filter(|column| !column.contains('.'))
            .map(str::to_string)
            .collect()
    }
}

/// Memoizing lineage walker over one parsed model
pub struct LineageAnalyzer<'a> {
    component: &'a SqlComponent,
    memo: HashMap<String, QueryLineage>,
    visiting: HashSet<String>,
}

impl<'a> LineageAnalyzer<'a> {
    pub fn new(component: &'a SqlComponent) -> Self {
        Self {
            component,
            memo: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    /// Lineage for every CTE and the main query
    pub fn analyze(component: &SqlComponent) -> ColumnLineage {
        let mut analyzer = LineageAnalyzer::new(component);
        let mut edges = BTreeMap::new();

        for cte in &component.ctes {
            for (column, sources) in analyzer.cte_lineage(&cte.name) {
                edges.insert(format!("{}.{column}", cte.name), sources);
            }
        }

        let main = analyzer.query_lineage(&component.main.select_items, &component.main.relations);
        for (column, sources) in main {
            edges.insert(format!("{MAIN_QUERY}.{column}"), sources);
        }

        ColumnLineage { edges }
    }

    /// Lineage of one CTE; a CTE already on the walk yields nothing
    pub fn cte_lineage(&mut self, name: &str) -> QueryLineage {
        if let Some(done) = self.memo.get(name) {
            return done.clone();
        }
        let component = self.component;
        let Some(cte) = component.get(name) else {
            return QueryLineage::new();
        };
        if !self.visiting.insert(cte.name.clone()) {
            return QueryLineage::new();
        }

        let lineage = self.query_lineage(&cte.select_items, &cte.relations);

        self.visiting.remove(&cte.name);
        self.memo.insert(cte.name.clone(), lineage.clone());
        lineage
    }

    fn query_lineage(&mut self, items: &[SelectItem], relations: &[Relation]) -> QueryLineage {
        let mut lineage = QueryLineage::new();

        for item in items {
            match item {
                SelectItem::Expression { name, refs, .. } => {
                    let sources = refs
                        .iter()
                        .flat_map(|r| self.resolve(r, relations))
                        .collect();
                    lineage.insert(name.clone(), sources);
                }
                SelectItem::Wildcard { qualifier } => {
                    let targets: Vec<&Relation> = relations
                        .iter()
                        .filter(|rel| qualifier.as_deref().map_or(true, |q| rel.qualifier() == q))
                        .collect();
                    for relation in targets {
                        for (column, sources) in self.expand(relation) {
                            lineage.entry(column).or_default().extend(sources);
                        }
                    }
                }
            }
        }

        lineage
    }

    /// Everything a `*` over `relation` yields
    fn expand(&mut self, relation: &Relation) -> QueryLineage {
        match &relation.target {
            RelationTarget::Table(name) if self.component.get(name).is_some() => self.cte_lineage(name),
            _ => {
                let mut lineage = QueryLineage::new();
                lineage.insert("*".to_string(), BTreeSet::from([format!("{}.*", relation.name())]));
                lineage
            }
        }
    }

    fn resolve(&mut self, column: &ColumnRef, relations: &[Relation]) -> BTreeSet<String> {
        if let Some(qualifier) = &column.qualifier {
            return match relations.iter().find(|rel| rel.qualifier() == qualifier || rel.name() == qualifier) {
                Some(relation) => self.resolve_in(relation, &column.column),
                None => BTreeSet::from([format!("{qualifier}.{}", column.column)]),
            };
        }

        if let [only] = relations {
            return self.resolve_in(only, &column.column);
        }

        // unqualified with several relations: CTEs that expose the column win
        let mut candidates: Vec<&Relation> = relations
            .iter()
            .filter(|rel| match &rel.target {
                RelationTarget::Table(name) => self.component.get(name).is_some_and(|_| {
                    self.component.cte_columns(name).names.contains(&column.column)
                }),
                _ => false,
            })
            .collect();
        if candidates.is_empty() {
            let external: Vec<&Relation> = relations
                .iter()
                .filter(|rel| !matches!(&rel.target, RelationTarget::Table(name) if self.component.get(name).is_some()))
                .collect();
            if let [only] = external.as_slice() {
                candidates.push(only);
            }
        }

        candidates
            .into_iter()
            .flat_map(|relation| self.resolve_in(relation, &column.column))
            .collect()
    }

    fn resolve_in(&mut self, relation: &Relation, column: &str) -> BTreeSet<String> {
        let RelationTarget::Table(name) = &relation.target else {
            return BTreeSet::from([format!("{}.{column}", relation.name())]);
        };
        if self.component.get(name).is_none() {
            return BTreeSet::from([format!("{name}.{column}")]);
        }

        let upstream = self.cte_lineage(name);
        if let Some(sources) = upstream.get(column) {
            return sources.clone();
        }
        match upstream.get("*") {
            Some(wildcards) => wildcards
                .iter()
                .map(|source| match source.strip_suffix(".*") {
                    Some(rel) => format!("{rel}.{column}"),
                    None => source.clone(),
                })
                .collect(),
            None => BTreeSet::from([format!("{name}.{column}")]),
        }
    }
}
