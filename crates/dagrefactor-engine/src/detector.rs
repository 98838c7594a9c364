//! Detector trait shared by all pattern detectors

use dagrefactor_core::Finding;
use crate::combinable::CombinableIntermediateDetector;
use crate::context::AnalysisContext;
use crate::redundant::RedundantReferenceDetector;
use crate::rejoin::RejoinDetector;
use crate::similarity::SimilarityDetector;

/// A structural check over the whole project
pub trait PatternDetector {
    /// Stable short name, used in logs
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Run against the shared context. Findings are returned in a
    /// deterministic order.
    fn detect(&self, ctx: &AnalysisContext<'_>) -> Vec<Finding>;
}

/// The four built-in detectors in report order
pub fn default_detectors() -> Vec<Box<dyn PatternDetector>> {
    vec![
        Box::new(RedundantReferenceDetector),
        Box::new(RejoinDetector),
        Box::new(CombinableIntermediateDetector),
        Box::new(SimilarityDetector),
    ]
}
