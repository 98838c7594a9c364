//! SQL parsing and analysis
//!
//! This crate handles:
//! - Depth-aware scanning of raw dbt SQL (literals, comments and Jinja are opaque)
//! - Resolving dbt-specific functions (ref, source, config)
//! - Splitting models into config block, CTEs and main query
//! - Column tokenization via the sqlparser tokenizer
//! - Structural feature counts and column lineage

pub mod scanner;
pub mod dbt_functions;
pub mod tokens;
pub mod relations;
pub mod normalize;
pub mod features;
pub mod components;
pub mod lineage;

pub use scanner::{Region, ScannedSql};
pub use dbt_functions::{DbtFunctionExtractor, DbtReference};
pub use tokens::{ColumnRef, ColumnTokenizer};
pub use relations::{relations, scan_relations, ClauseKind, Relation, RelationMatch, RelationTarget};
pub use normalize::normalize_sql;
pub use features::SqlFeatures;
pub use components::{
    render_sql, ColumnSet, ComponentParser, CteReference, ParseError, QueryParts, SelectItem,
    SqlComponent,
};
pub use lineage::{ColumnLineage, LineageAnalyzer, MAIN_QUERY};
