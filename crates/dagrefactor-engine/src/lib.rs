//! dagrefactor engine - DAG analysis logic
//!
//! This crate implements the analysis passes:
//! - Redundant-reference, rejoin, combinable-intermediate and similarity detectors
//! - Complexity scoring
//! - SQL refactoring for redundant references
//! - The orchestrator that assembles a `Report`

pub mod context;
pub mod detector;
mod usage;
pub mod redundant;
pub mod rejoin;
pub mod combinable;
pub mod similarity;
pub mod complexity;
pub mod rewrite;
pub mod recommendations;
pub mod analyzer;

#[cfg(test)]
mod testing;

pub use context::{AnalysisContext, ComponentSource, FreshParse};
pub use detector::{default_detectors, PatternDetector};
pub use redundant::RedundantReferenceDetector;
pub use rejoin::RejoinDetector;
pub use combinable::CombinableIntermediateDetector;
pub use similarity::SimilarityDetector;
pub use complexity::ComplexityScorer;
pub use rewrite::{fingerprint, RefactoringGenerator, RewriteError};
pub use recommendations::build_recommendations;
pub use usage::PassThrough;
pub use analyzer::Analyzer;
