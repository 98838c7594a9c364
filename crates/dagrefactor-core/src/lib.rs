//! dagrefactor Core
//!
//! Core domain model with stable, versioned types.
//! Never rename finding codes - they are part of the public API.

pub mod config;
pub mod error;
pub mod finding;
pub mod metrics;
pub mod report;

pub use config::{
    AllowlistRules, ComplexityConfig, ComplexityWeights, Config, ConfigError, DialectConfig,
    IntermediateMatcher, NamingConfig, RewriteConfig, SimilarityConfig, SimilarityWeights,
};
pub use error::AnalysisError;
pub use finding::{
    Confidence, Finding, FindingCode, FindingKind, MergePattern, Note, Severity,
    SimilarityComponents,
};
pub use metrics::ComplexityMetrics;
pub use report::{
    FindingRow, ParseFailure, Recommendation, RecommendationKind, Report, ReportSummary,
    ReportVersion, RewriteArtifact, SkippedRewrite,
};
