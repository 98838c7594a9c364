//! Salsa inputs and tracked functions for incremental computation
//!
//! Inputs are the raw SQL of each model and the tokenizer dialect. Tracked
//! functions derive the parsed components and output column sets from them.

use dagrefactor_core::DialectConfig;
use dagrefactor_sql::{ColumnSet, ComponentParser, DbtFunctionExtractor, ParseError, SqlComponent};
use std::collections::BTreeSet;

/// Input: raw SQL of one model
///
/// Changes when the model file is edited or the manifest is recompiled.
#[salsa::input]
pub struct ModelSql {
    /// unique_id of the model
    #[returns(ref)]
    pub model_id: String,

    /// Raw, uncompiled SQL text
    #[returns(ref)]
    pub sql: String,
}

/// Input: dialect used by the column tokenizer
#[salsa::input]
pub struct DialectInput {
    pub dialect: DialectConfig,
}

/// Tracked function: split a model into config block, CTEs and main query
///
/// Recomputed only when the model's SQL or the dialect changes.
#[salsa::tracked]
pub fn parse_components(
    db: &dyn salsa::Database,
    model: ModelSql,
    dialect: DialectInput,
) -> Result<SqlComponent, ParseError> {
    let parser = ComponentParser::from_dialect(&dialect.dialect(db));
    tracing::trace!(model = %model.model_id(db), "parsing model components");
    parser.parse(model.sql(db))
}

/// Tracked function: columns exposed by the model's final select
#[salsa::tracked]
pub fn output_columns(
    db: &dyn salsa::Database,
    model: ModelSql,
    dialect: DialectInput,
) -> Result<ColumnSet, ParseError> {
    parse_components(db, model, dialect).map(|component| component.output_columns())
}

/// Tracked function: dbt dependencies referenced in the model text
///
/// Independent of the dialect, so a dialect change does not invalidate it.
#[salsa::tracked]
pub fn textual_dependencies(db: &dyn salsa::Database, model: ModelSql) -> BTreeSet<String> {
    DbtFunctionExtractor::dependencies(model.sql(db))
}
