//! Workflow stages and the transitions between them

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{PathError, PathResult};

/// Machine state of one workflow run.
///
/// ```text
/// Init → Planned → Retrieved → Scored → Explained ─┬──────────────────────────► Done
///                                                  └► RemediateProposed → Simulated → Verified ─┘
/// ```
///
/// `Failed` is absorbing and reachable from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Init,
    Planned,
    Retrieved,
    Scored,
    Explained,
    RemediateProposed,
    Simulated,
    Verified,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Planned => "planned",
            Stage::Retrieved => "retrieved",
            Stage::Scored => "scored",
            Stage::Explained => "explained",
            Stage::RemediateProposed => "remediate_proposed",
            Stage::Simulated => "simulated",
            Stage::Verified => "verified",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn allowed_transitions(from: Stage) -> Vec<Stage> {
    use Stage::*;
    match from {
        Init => vec![Planned, Failed],
        Planned => vec![Retrieved, Failed],
        Retrieved => vec![Scored, Failed],
        Scored => vec![Explained, Failed],
        Explained => vec![RemediateProposed, Done, Failed],
        // Done directly when no action was proposed or simulation was not asked for
        RemediateProposed => vec![Simulated, Done, Failed],
        // Done directly when verification rejects the simulation
        Simulated => vec![Verified, Done, Failed],
        Verified => vec![Done, Failed],
        Done => vec![],
        Failed => vec![],
    }
}

pub fn validate_transition(from: Stage, to: Stage) -> PathResult<()> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(PathError::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path() {
        let chain = [
            Stage::Init,
            Stage::Planned,
            Stage::Retrieved,
            Stage::Scored,
            Stage::Explained,
            Stage::RemediateProposed,
            Stage::Simulated,
            Stage::Verified,
            Stage::Done,
        ];
        for pair in chain.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{:?}", pair);
        }
    }

    #[test]
    fn test_no_backward_or_skipping() {
        assert!(validate_transition(Stage::Scored, Stage::Planned).is_err());
        assert!(validate_transition(Stage::Planned, Stage::Scored).is_err());
        assert!(validate_transition(Stage::Explained, Stage::Simulated).is_err());
        assert_eq!(
            validate_transition(Stage::Done, Stage::Init),
            Err(PathError::IllegalTransition {
                from: "done".into(),
                to: "init".into()
            })
        );
    }

    #[test]
    fn test_failed_is_absorbing() {
        assert!(allowed_transitions(Stage::Failed).is_empty());
        for stage in [Stage::Init, Stage::Retrieved, Stage::Simulated] {
            assert!(validate_transition(stage, Stage::Failed).is_ok());
        }
    }
}
