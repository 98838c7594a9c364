//! Memoized component source for repeated analysis runs

use std::collections::HashMap;
use dagrefactor_core::DialectConfig;
use dagrefactor_engine::ComponentSource;
use dagrefactor_sql::{ColumnSet, ParseError, SqlComponent};
use salsa::Setter;
use crate::db::AnalysisDatabase;
use crate::queries::{self, DialectInput, ModelSql};

/// A `ComponentSource` backed by the salsa database
///
/// Each model gets one input; re-analyzing with edited SQL updates that input
/// and only the edited models are parsed again.
pub struct ComponentCache {
    db: AnalysisDatabase,
    dialect: DialectInput,
    inputs: HashMap<String, ModelSql>,
}

impl ComponentCache {
    pub fn new(dialect: DialectConfig) -> Self {
        let db = AnalysisDatabase::default();
        let dialect = DialectInput::new(&db, dialect);
        Self {
            db,
            dialect,
            inputs: HashMap::new(),
        }
    }

    /// Change the tokenizer dialect; every model is re-parsed on next use
    pub fn set_dialect(&mut self, dialect: DialectConfig) {
        if self.dialect.dialect(&self.db) != dialect {
            self.dialect.set_dialect(&mut self.db).to(dialect);
        }
    }

    /// Number of models tracked
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn database(&self) -> &AnalysisDatabase {
        &self.db
    }

    /// Input for `model_id`, updated when its SQL differs
    fn input(&mut self, model_id: &str, sql: &str) -> ModelSql {
        if let Some(&input) = self.inputs.get(model_id) {
            let changed = input.sql(&self.db) != sql;
            if changed {
                tracing::debug!(model = model_id, "model SQL changed");
                input.set_sql(&mut self.db).to(sql.to_string());
            }
            return input;
        }

        let input = ModelSql::new(&self.db, model_id.to_string(), sql.to_string());
        self.inputs.insert(model_id.to_string(), input);
        input
    }
}

impl Default for ComponentCache {
    fn default() -> Self {
        Self::new(DialectConfig::default())
    }
}

impl ComponentSource for ComponentCache {
    fn components(&mut self, model_id: &str, sql: &str) -> Result<SqlComponent, ParseError> {
        let input = self.input(model_id, sql);
        queries::parse_components(&self.db, input, self.dialect)
    }

    fn output_columns(&mut self, model_id: &str, sql: &str) -> Result<ColumnSet, ParseError> {
        let input = self.input(model_id, sql);
        queries::output_columns(&self.db, input, self.dialect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edited_sql_is_reparsed() {
        let mut cache = ComponentCache::default();
        let first = cache
            .components("model.shop.orders", "select id from {{ ref('stg_orders') }}")
            .unwrap();
        let again = cache
            .components("model.shop.orders", "select id from {{ ref('stg_orders') }}")
            .unwrap();
        assert_eq!(first, again);

        let edited = cache
            .components(
                "model.shop.orders",
                "with o as (select id, amount from {{ ref('stg_orders') }}) select * from o",
            )
            .unwrap();
        assert_eq!(edited.cte_names().collect::<Vec<_>>(), vec!["o"]);
        assert_eq!(cache.len(), 1);

        let columns = cache
            .output_columns(
                "model.shop.orders",
                "with o as (select id, amount from {{ ref('stg_orders') }}) select * from o",
            )
            .unwrap();
        assert!(columns.exposes("amount"));
    }

    #[test]
    fn parse_errors_are_cached_values() {
        let mut cache = ComponentCache::default();
        assert!(cache.components("model.shop.macro_only", "{{ run_it() }}").is_err());
        assert!(cache
            .components("model.shop.macro_only", "select 1 as id")
            .is_ok());
    }
}
