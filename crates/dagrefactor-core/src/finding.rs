//! Finding codes and structured refactoring findings
//!
//! IMPORTANT: Finding codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Finding code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingCode {
    /// Model references both a parent and one of that parent's own parents
    RedundantReference,

    /// Model re-derives a concept through an intermediate that only it consumes
    RejoinPattern,

    /// Two intermediate models could be merged
    CombinableIntermediate,

    /// Two models have near-duplicate transformations
    SimilarModels,
}

impl FindingCode {
    /// Get the finding code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RedundantReference => "REDUNDANT_REFERENCE",
            Self::RejoinPattern => "REJOIN_PATTERN",
            Self::CombinableIntermediate => "COMBINABLE_INTERMEDIATE",
            Self::SimilarModels => "SIMILAR_MODELS",
        }
    }
}

impl std::fmt::Display for FindingCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity level, shared by findings and notes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - should be reviewed
    Warn,

    /// Error - analysis could not complete for this item
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A leveled observation attached to a finding or metrics row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub level: Severity,
    pub message: String,
}

impl Note {
    pub fn new(level: Severity, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// How strongly the SQL corroborates a graph-level finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

/// Shape of a combinable intermediate pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePattern {
    /// Intermediate with a single child that is itself an intermediate (merge downward)
    SingleChild,

    /// Intermediate with a single intermediate parent (merge upward)
    SingleParent,
}

impl std::fmt::Display for MergePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingleChild => write!(f, "single_child"),
            Self::SingleParent => write!(f, "single_parent"),
        }
    }
}

/// Per-component similarity scores, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SimilarityComponents {
    pub text: f64,
    pub refs: f64,
    pub sources: f64,
    pub structure: f64,
}

/// The four finding variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingKind {
    RedundantReference {
        model: String,
        parent: String,
        grandparent: String,
    },

    RejoinPattern {
        model: String,
        parent: String,
        intermediate: String,
        confidence: Confidence,
    },

    CombinableIntermediate {
        model: String,
        related: String,
        pattern: MergePattern,
        feasible: bool,
        /// Reasons the merge cannot be automated
        #[serde(default)]
        blockers: Vec<String>,
    },

    SimilarPair {
        model1: String,
        model2: String,
        score: f64,
        components: SimilarityComponents,
    },
}

/// A finding with its suggestion and notes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(flatten)]
    pub kind: FindingKind,

    pub severity: Severity,

    /// Human-readable suggestion
    pub suggestion: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
}

impl Finding {
    /// Create a new finding without notes
    pub fn new(kind: FindingKind, severity: Severity, suggestion: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            suggestion: suggestion.into(),
            notes: Vec::new(),
        }
    }

    /// Attach a note
    pub fn with_note(mut self, level: Severity, message: impl Into<String>) -> Self {
        self.notes.push(Note::new(level, message));
        self
    }

    pub fn code(&self) -> FindingCode {
        match self.kind {
            FindingKind::RedundantReference { .. } => FindingCode::RedundantReference,
            FindingKind::RejoinPattern { .. } => FindingCode::RejoinPattern,
            FindingKind::CombinableIntermediate { .. } => FindingCode::CombinableIntermediate,
            FindingKind::SimilarPair { .. } => FindingCode::SimilarModels,
        }
    }

    /// The model the finding is about
    pub fn model(&self) -> &str {
        match &self.kind {
            FindingKind::RedundantReference { model, .. }
            | FindingKind::RejoinPattern { model, .. }
            | FindingKind::CombinableIntermediate { model, .. } => model,
            FindingKind::SimilarPair { model1, .. } => model1,
        }
    }

    /// The other model named by the finding, if any
    pub fn related_model(&self) -> Option<&str> {
        match &self.kind {
            FindingKind::RedundantReference { grandparent, .. } => Some(grandparent),
            FindingKind::RejoinPattern { intermediate, .. } => Some(intermediate),
            FindingKind::CombinableIntermediate { related, .. } => Some(related),
            FindingKind::SimilarPair { model2, .. } => Some(model2),
        }
    }
}
