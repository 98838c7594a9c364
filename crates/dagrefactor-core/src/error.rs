//! Run-level error taxonomy
//!
//! `MalformedManifest` and `CyclicDependency` abort a run. `MalformedSql` and
//! `UnrewritableFinding` are per-model conditions that are recorded in the
//! report as data and never abort the batch.

/// Errors surfaced by an analysis run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("Cyclic dependency between: {}", .0.join(", "))]
    CyclicDependency(Vec<String>),

    #[error("Malformed SQL in {model}: {reason}")]
    MalformedSql { model: String, reason: String },

    #[error("Cannot rewrite {model}: {reason}")]
    UnrewritableFinding { model: String, reason: String },
}

impl AnalysisError {
    /// Whether this error aborts the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MalformedManifest(_) | Self::CyclicDependency(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality() {
        assert!(AnalysisError::MalformedManifest("missing nodes".into()).is_fatal());
        assert!(AnalysisError::CyclicDependency(vec!["a".into(), "b".into()]).is_fatal());
        assert!(!AnalysisError::MalformedSql {
            model: "m".into(),
            reason: "no SELECT".into()
        }
        .is_fatal());
    }

    #[test]
    fn cycle_message_lists_nodes() {
        let err = AnalysisError::CyclicDependency(vec!["model.a".into(), "model.b".into()]);
        assert_eq!(err.to_string(), "Cyclic dependency between: model.a, model.b");
    }
}
