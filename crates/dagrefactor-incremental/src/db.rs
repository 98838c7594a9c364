//! Salsa database definition for incremental computation
//!
//! The database stores per-model SQL inputs and memoizes the parsed
//! components derived from them.

/// Database trait for dagrefactor incremental computation
///
/// All tracked functions take `&dyn Db` as their first parameter.
pub trait Db: salsa::Database {}

/// Main Salsa database implementation
///
/// ## Usage
///
/// ```rust,ignore
/// use dagrefactor_incremental::{AnalysisDatabase, queries};
///
/// let db = AnalysisDatabase::default();
/// let dialect = queries::DialectInput::new(&db, DialectConfig::Ansi);
/// let model = queries::ModelSql::new(&db, "model.shop.orders".into(), sql);
///
/// // Cached until the model's SQL or the dialect changes
/// let component = queries::parse_components(&db, model, dialect);
/// ```
#[salsa::db]
#[derive(Default, Clone)]
pub struct AnalysisDatabase {
    storage: salsa::Storage<Self>,
}

#[salsa::db]
impl salsa::Database for AnalysisDatabase {}

impl Db for AnalysisDatabase {}
