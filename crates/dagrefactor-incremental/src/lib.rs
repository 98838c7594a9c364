//! Incremental computation layer using Salsa
//!
//! Memoizes per-model parsing so repeated analysis runs (watch mode, editor
//! integrations, re-runs after a recompile) only re-parse models whose SQL
//! changed.
//!
//! ## Architecture
//!
//! - **Inputs**: ModelSql, DialectInput
//! - **Tracked Functions**: component parsing, output columns, textual dependencies
//! - **ComponentCache**: plugs the database into the analysis engine
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dagrefactor_incremental::ComponentCache;
//!
//! let mut cache = ComponentCache::new(config.dialect.clone());
//! let report = analyzer.analyze(&project, &mut cache);
//!
//! // After editing models, only the changed ones are parsed again
//! let report = analyzer.analyze(&updated_project, &mut cache);
//! ```

pub mod db;
pub mod queries;
pub mod memo;

pub use db::{AnalysisDatabase, Db};
pub use memo::ComponentCache;
