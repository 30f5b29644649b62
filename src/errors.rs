//! Error taxonomy for the path engine and workflow
//!
//! Only `Retrieval` aborts a workflow. The other conditions in the
//! taxonomy (scorer unavailable, planning ambiguous, remediation
//! infeasible, simulation unavailable) are recovered locally and surface
//! as [`crate::models::Notice`] values; they still have variants here so
//! collaborators can report them through `Result`.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    /// Graph backend unreachable, timed out, or the query was malformed
    #[error("could not retrieve graph data: {0}")]
    Retrieval(String),

    #[error("scorer '{scorer}' unavailable: {reason}")]
    ScorerUnavailable { scorer: String, reason: String },

    #[error("planning ambiguous: {0}")]
    PlanningAmbiguous(String),

    #[error("no remediation possible: {0}")]
    RemediationInfeasible(String),

    #[error("simulation unavailable: {0}")]
    SimulationUnavailable(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("illegal workflow transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },
}

impl PathError {
    /// Whether a single retry is worthwhile
    pub fn is_transient(&self) -> bool {
        match self {
            PathError::Retrieval(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("timed out") || msg.contains("unreachable") || msg.contains("busy")
            }
            _ => false,
        }
    }

    /// Whether the condition aborts the workflow
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PathError::Retrieval(_) | PathError::InvalidRequest(_) | PathError::IllegalTransition { .. }
        )
    }
}

pub type PathResult<T> = Result<T, PathError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PathError::Retrieval("call timed out after 5000ms".into()).is_transient());
        assert!(PathError::Retrieval("backend unreachable".into()).is_transient());
        assert!(!PathError::Retrieval("unknown asset 'x'".into()).is_transient());
        assert!(!PathError::PlanningAmbiguous("no target".into()).is_transient());
    }

    #[test]
    fn test_only_retrieval_class_is_fatal() {
        assert!(PathError::Retrieval("down".into()).is_fatal());
        assert!(!PathError::ScorerUnavailable {
            scorer: "learned".into(),
            reason: "timeout".into()
        }
        .is_fatal());
        assert!(!PathError::SimulationUnavailable("inconsistent".into()).is_fatal());
    }
}
