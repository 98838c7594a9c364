//! Report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};
use crate::finding::{Finding, FindingCode};
use crate::metrics::ComplexityMetrics;

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Summary statistics for a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub models_analyzed: usize,
    pub parse_failures: usize,
    pub complex_models: usize,
    pub redundant_references: usize,
    pub rejoin_patterns: usize,
    pub combinable_intermediates: usize,
    pub similar_pairs: usize,
    pub rewrites: usize,
}

/// Rewritten SQL produced for one redundant-reference finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteArtifact {
    /// Model unique_id
    pub model: String,

    /// Model display name
    pub model_name: String,

    pub original_sql: String,

    pub rewritten_sql: String,

    /// Ordered human-readable change log
    pub changes: Vec<String>,

    /// Reference that was removed (grandparent name)
    pub removed_reference: String,

    /// Reference that replaces it (parent name)
    pub replacement: String,

    /// SHA-256 of `original_sql`, hex encoded
    pub original_fingerprint: String,
}

/// A redundant-reference finding that could not be rewritten safely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRewrite {
    pub model: String,
    pub grandparent: String,
    pub reason: String,
}

/// A model excluded from CTE-level detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub model: String,
    pub reason: String,
}

/// Recommendation category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    Complexity,
    RedundantReferences,
    RejoinPatterns,
    CombinableIntermediates,
    SimilarLogic,
}

impl RecommendationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complexity => "complexity",
            Self::RedundantReferences => "redundant_references",
            Self::RejoinPatterns => "rejoin_patterns",
            Self::CombinableIntermediates => "combinable_intermediates",
            Self::SimilarLogic => "similar_logic",
        }
    }
}

/// Aggregated advice over a group of models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub model_pairs: Vec<(String, String)>,

    pub suggestion: String,
}

/// One flattened row for tabular writers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingRow {
    pub kind: String,
    pub model: String,
    pub related_model: Option<String>,
    pub suggestion: String,
}

/// Analysis report (report.json v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    pub summary: ReportSummary,

    pub complexity: Vec<ComplexityMetrics>,

    pub redundant_references: Vec<Finding>,

    pub rejoin_patterns: Vec<Finding>,

    pub combinable_intermediates: Vec<Finding>,

    pub similar_pairs: Vec<Finding>,

    pub rewrites: Vec<RewriteArtifact>,

    #[serde(default)]
    pub skipped_rewrites: Vec<SkippedRewrite>,

    #[serde(default)]
    pub parse_failures: Vec<ParseFailure>,

    #[serde(default)]
    pub recommendations: Vec<Recommendation>,

    /// Metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Report {
    /// Create a new empty report
    pub fn new() -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary: ReportSummary::default(),
            complexity: Vec::new(),
            redundant_references: Vec::new(),
            rejoin_patterns: Vec::new(),
            combinable_intermediates: Vec::new(),
            similar_pairs: Vec::new(),
            rewrites: Vec::new(),
            skipped_rewrites: Vec::new(),
            parse_failures: Vec::new(),
            recommendations: Vec::new(),
            metadata: None,
        }
    }

    /// Add a finding to the collection matching its code
    pub fn add_finding(&mut self, finding: Finding) {
        match finding.code() {
            FindingCode::RedundantReference => {
                self.summary.redundant_references += 1;
                self.redundant_references.push(finding);
            }
            FindingCode::RejoinPattern => {
                self.summary.rejoin_patterns += 1;
                self.rejoin_patterns.push(finding);
            }
            FindingCode::CombinableIntermediate => {
                self.summary.combinable_intermediates += 1;
                self.combinable_intermediates.push(finding);
            }
            FindingCode::SimilarModels => {
                self.summary.similar_pairs += 1;
                self.similar_pairs.push(finding);
            }
        }
    }

    /// Add a complexity row
    pub fn add_metrics(&mut self, metrics: ComplexityMetrics) {
        self.summary.models_analyzed += 1;
        if metrics.is_complex {
            self.summary.complex_models += 1;
        }
        if metrics.parse_failed {
            self.summary.parse_failures += 1;
        }
        self.complexity.push(metrics);
    }

    pub fn add_rewrite(&mut self, artifact: RewriteArtifact) {
        self.summary.rewrites += 1;
        self.rewrites.push(artifact);
    }

    /// All findings in report order
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.redundant_references
            .iter()
            .chain(&self.rejoin_patterns)
            .chain(&self.combinable_intermediates)
            .chain(&self.similar_pairs)
    }

    /// Flatten findings into tabular rows
    pub fn finding_rows(&self) -> Vec<FindingRow> {
        self.findings()
            .map(|finding| FindingRow {
                kind: finding.code().as_str().to_string(),
                model: finding.model().to_string(),
                related_model: finding.related_model().map(str::to_string),
                suggestion: finding.suggestion.clone(),
            })
            .collect()
    }

    /// Whether any structural finding was produced
    pub fn has_findings(&self) -> bool {
        self.findings().next().is_some()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{FindingKind, MergePattern, Severity};

    #[test]
    fn empty_report() {
        let report = Report::new();
        assert_eq!(report.version, ReportVersion::CURRENT);
        assert_eq!(report.summary, ReportSummary::default());
        assert!(!report.has_findings());
    }

    #[test]
    fn findings_are_routed_by_code() {
        let mut report = Report::new();
        report.add_finding(Finding::new(
            FindingKind::RedundantReference {
                model: "m".into(),
                parent: "p".into(),
                grandparent: "g".into(),
            },
            Severity::Warn,
            "remove g",
        ));
        report.add_finding(Finding::new(
            FindingKind::CombinableIntermediate {
                model: "int_a".into(),
                related: "int_b".into(),
                pattern: MergePattern::SingleChild,
                feasible: true,
                blockers: Vec::new(),
            },
            Severity::Info,
            "merge",
        ));

        assert_eq!(report.summary.redundant_references, 1);
        assert_eq!(report.summary.combinable_intermediates, 1);
        assert_eq!(report.redundant_references.len(), 1);

        let rows = report.finding_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].kind, "REDUNDANT_REFERENCE");
        assert_eq!(rows[0].related_model.as_deref(), Some("g"));
        assert_eq!(rows[1].model, "int_a");
    }

    #[test]
    fn metrics_update_summary() {
        let mut report = Report::new();
        report.add_metrics(ComplexityMetrics {
            model: "m".into(),
            is_complex: true,
            ..ComplexityMetrics::default()
        });
        report.add_metrics(ComplexityMetrics::parse_failure("broken", "no SELECT"));

        assert_eq!(report.summary.models_analyzed, 2);
        assert_eq!(report.summary.complex_models, 1);
        assert_eq!(report.summary.parse_failures, 1);
    }

    #[test]
    fn report_serialization() {
        let report = Report::new();
        let json = report.to_json().unwrap();
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"redundant_references\""));
    }
}
