//! Project fixtures for unit tests

use dagrefactor_dbt::{ModelNode, Project, ResourceKind};
use dagrefactor_sql::{DbtFunctionExtractor, DbtReference};

/// Build a project in package `shop` from `(name, sql)` pairs. Dependencies
/// come from the refs and sources in each model's SQL.
pub(crate) fn project(models: &[(&str, &str)]) -> Project {
    let nodes = models
        .iter()
        .map(|(name, sql)| {
            let mut refs = Vec::new();
            let mut sources = Vec::new();
            let mut depends_on = Vec::new();
            for reference in DbtFunctionExtractor::extract(sql) {
                match reference {
                    DbtReference::Ref { model_name, .. } => {
                        depends_on.push(format!("model.shop.{model_name}"));
                        refs.push(model_name);
                    }
                    DbtReference::Source { source_name, table_name } => {
                        depends_on.push(format!("source.shop.{source_name}.{table_name}"));
                        sources.push(format!("{source_name}.{table_name}"));
                    }
                }
            }
            depends_on.sort();
            depends_on.dedup();
            ModelNode {
                unique_id: format!("model.shop.{name}"),
                name: name.to_string(),
                raw_sql: sql.to_string(),
                refs,
                sources,
                depends_on,
                resource_kind: ResourceKind::Model,
                original_file_path: format!("models/{name}.sql"),
            }
        })
        .collect();

    Project::from_models(nodes).unwrap()
}
