//! Validated, typed view of a dbt project
//!
//! `Project` is built once per run from a `Manifest`. Model nodes are checked
//! for the fields the analysis needs and the dependency graph is checked for
//! cycles before anything downstream sees it.

use std::collections::{BTreeMap, HashMap};
use serde::Serialize;
use crate::dag::{DependencyGraph, NodeId};
use crate::manifest::{Manifest, ManifestError, ManifestNode};

/// dbt resource type of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Model,
    Seed,
    Snapshot,
    Test,
    Analysis,
    Other(String),
}

impl ResourceKind {
    pub fn parse(resource_type: &str) -> Self {
        match resource_type {
            "model" => Self::Model,
            "seed" => Self::Seed,
            "snapshot" => Self::Snapshot,
            "test" => Self::Test,
            "analysis" => Self::Analysis,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One model as seen by the analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelNode {
    pub unique_id: String,
    pub name: String,
    pub raw_sql: String,
    /// Declared `ref()` model names
    pub refs: Vec<String>,
    /// Declared sources as `source_name.table`
    pub sources: Vec<String>,
    /// Resolved upstream unique_ids
    pub depends_on: Vec<String>,
    pub resource_kind: ResourceKind,
    pub original_file_path: String,
}

impl ModelNode {
    fn from_manifest(unique_id: &str, node: &ManifestNode) -> Result<Self, ManifestError> {
        if node.unique_id != unique_id {
            return Err(ManifestError::InvalidNode {
                node: unique_id.to_string(),
                reason: format!("key does not match unique_id '{}'", node.unique_id),
            });
        }
        if node.name.is_empty() {
            return Err(ManifestError::MissingField {
                node: unique_id.to_string(),
                field: "name".to_string(),
            });
        }
        let raw_sql = node.raw_code.clone().ok_or_else(|| ManifestError::MissingField {
            node: unique_id.to_string(),
            field: "raw_code".to_string(),
        })?;

        let refs = node
            .refs
            .iter()
            .map(|entry| {
                entry.name().map(str::to_string).ok_or_else(|| ManifestError::InvalidNode {
                    node: unique_id.to_string(),
                    reason: "empty ref entry".to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let sources = node
            .sources
            .iter()
            .map(|parts| match parts.as_slice() {
                [source_name, table] => Ok(format!("{source_name}.{table}")),
                _ => Err(ManifestError::InvalidNode {
                    node: unique_id.to_string(),
                    reason: format!("source entry must be [source_name, table], got {parts:?}"),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            unique_id: unique_id.to_string(),
            name: node.name.clone(),
            raw_sql,
            refs,
            sources,
            depends_on: node.depends_on.nodes.clone(),
            resource_kind: ResourceKind::parse(&node.resource_type),
            original_file_path: node.original_file_path.clone(),
        })
    }
}

/// Models, sources and the dependency graph of one manifest snapshot
#[derive(Debug, Clone)]
pub struct Project {
    models: BTreeMap<NodeId, ModelNode>,
    /// source unique_id -> `source_name.table`
    source_names: BTreeMap<NodeId, String>,
    /// model name -> unique_id
    name_index: HashMap<String, NodeId>,
    graph: DependencyGraph,
}

impl Project {
    /// Validate a manifest and build the project
    pub fn from_manifest(manifest: &Manifest) -> Result<Self, ManifestError> {
        let models = manifest
            .models()
            .into_iter()
            .map(|(id, node)| ModelNode::from_manifest(id, node))
            .collect::<Result<Vec<_>, _>>()?;

        let source_names = manifest
            .sources
            .iter()
            .map(|(id, source)| (id.clone(), format!("{}.{}", source.source_name, source.name)))
            .collect();

        Self::build(models, source_names)
    }

    /// Build a project from already-typed models; used by tests and embedders
    pub fn from_models(models: Vec<ModelNode>) -> Result<Self, ManifestError> {
        Self::build(models, BTreeMap::new())
    }

    fn build(models: Vec<ModelNode>, source_names: BTreeMap<NodeId, String>) -> Result<Self, ManifestError> {
        let mut graph = DependencyGraph::new();
        for model in &models {
            graph.add_node(model.unique_id.as_str());
            for dep in &model.depends_on {
                graph.add_edge(model.unique_id.as_str(), dep.as_str());
            }
        }
        for source_id in source_names.keys() {
            graph.add_node(source_id.as_str());
        }

        graph.topological_sort().map_err(ManifestError::CyclicDependency)?;

        let name_index = models
            .iter()
            .map(|model| (model.name.clone(), model.unique_id.clone()))
            .collect();
        let models = models
            .into_iter()
            .map(|model| (model.unique_id.clone(), model))
            .collect();

        Ok(Self {
            models,
            source_names,
            name_index,
            graph,
        })
    }

    /// All models, ordered by unique_id
    pub fn models(&self) -> impl Iterator<Item = &ModelNode> {
        self.models.values()
    }

    pub fn model(&self, unique_id: &str) -> Option<&ModelNode> {
        self.models.get(unique_id)
    }

    pub fn is_model(&self, unique_id: &str) -> bool {
        self.models.contains_key(unique_id)
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Look up a model by unique_id or by name
    pub fn resolve(&self, name_or_id: &str) -> Option<&ModelNode> {
        self.models.get(name_or_id).or_else(|| {
            self.name_index
                .get(name_or_id)
                .and_then(|id| self.models.get(id))
        })
    }

    /// How SQL text refers to a node: model name, `source_name.table` for
    /// sources, otherwise the last dotted segment of the id.
    pub fn reference_name(&self, unique_id: &str) -> String {
        if let Some(model) = self.models.get(unique_id) {
            return model.name.clone();
        }
        if let Some(name) = self.source_names.get(unique_id) {
            return name.clone();
        }
        let parts: Vec<&str> = unique_id.split('.').collect();
        match parts.as_slice() {
            ["source", _, source_name, table] => format!("{source_name}.{table}"),
            [.., last] => (*last).to_string(),
            [] => unique_id.to_string(),
        }
    }

    /// Model parents of a node (non-model parents are dropped)
    pub fn model_parents(&self, unique_id: &str) -> Vec<&str> {
        self.graph
            .parents(unique_id)
            .into_iter()
            .filter(|id| self.is_model(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn model(id: &str, deps: &[&str]) -> ModelNode {
        let name = id.rsplit('.').next().unwrap_or(id).to_string();
        ModelNode {
            unique_id: id.to_string(),
            name,
            raw_sql: "select 1".to_string(),
            refs: Vec::new(),
            sources: Vec::new(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            resource_kind: ResourceKind::Model,
            original_file_path: String::new(),
        }
    }

    #[test]
    fn from_manifest_validates_models() {
        let manifest = Manifest::from_str(
            r#"{
                "metadata": {"dbt_schema_version": "v11", "dbt_version": "1.7.0"},
                "nodes": {
                    "model.shop.stg_orders": {
                        "unique_id": "model.shop.stg_orders",
                        "name": "stg_orders",
                        "resource_type": "model",
                        "raw_code": "select * from {{ source('raw', 'orders') }}",
                        "sources": [["raw", "orders"]],
                        "depends_on": {"nodes": ["source.shop.raw.orders"]}
                    },
                    "seed.shop.countries": {
                        "unique_id": "seed.shop.countries",
                        "name": "countries",
                        "resource_type": "seed"
                    }
                },
                "sources": {
                    "source.shop.raw.orders": {
                        "unique_id": "source.shop.raw.orders",
                        "source_name": "raw",
                        "name": "orders"
                    }
                }
            }"#,
        )
        .unwrap();

        let project = Project::from_manifest(&manifest).unwrap();
        assert_eq!(project.model_count(), 1);

        let stg = project.resolve("stg_orders").unwrap();
        assert_eq!(stg.sources, vec!["raw.orders".to_string()]);
        assert_eq!(stg.resource_kind, ResourceKind::Model);
        assert_eq!(project.reference_name("source.shop.raw.orders"), "raw.orders");
        assert_eq!(project.reference_name("model.shop.stg_orders"), "stg_orders");
        assert!(project.model_parents("model.shop.stg_orders").is_empty());
    }

    #[test]
    fn missing_raw_code_is_rejected() {
        let manifest = Manifest::from_str(
            r#"{
                "metadata": {"dbt_schema_version": "v11", "dbt_version": "1.7.0"},
                "nodes": {
                    "model.shop.broken": {
                        "unique_id": "model.shop.broken",
                        "name": "broken",
                        "resource_type": "model"
                    }
                }
            }"#,
        )
        .unwrap();

        let err = Project::from_manifest(&manifest).unwrap_err();
        assert!(matches!(err, ManifestError::MissingField { ref field, .. } if field == "raw_code"));
    }

    #[test]
    fn mismatched_key_is_rejected() {
        let manifest = Manifest::from_str(
            r#"{
                "metadata": {"dbt_schema_version": "v11", "dbt_version": "1.7.0"},
                "nodes": {
                    "model.shop.a": {
                        "unique_id": "model.shop.b",
                        "name": "b",
                        "resource_type": "model",
                        "raw_code": "select 1"
                    }
                }
            }"#,
        )
        .unwrap();

        assert!(matches!(
            Project::from_manifest(&manifest),
            Err(ManifestError::InvalidNode { .. })
        ));
    }

    #[test]
    fn cycles_are_rejected() {
        let err = Project::from_models(vec![
            model("model.p.a", &["model.p.b"]),
            model("model.p.b", &["model.p.a"]),
        ])
        .unwrap_err();

        match err {
            ManifestError::CyclicDependency(nodes) => {
                assert_eq!(nodes, vec!["model.p.a".to_string(), "model.p.b".to_string()]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn model_parents_skip_sources() {
        let project = Project::from_models(vec![
            model("model.p.stg", &["source.p.raw.t"]),
            model("model.p.fct", &["model.p.stg", "source.p.raw.t"]),
        ])
        .unwrap();

        assert_eq!(project.model_parents("model.p.fct"), vec!["model.p.stg"]);
        assert_eq!(project.reference_name("source.p.raw.t"), "raw.t");
    }
}
