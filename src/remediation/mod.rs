//! Remediation planning and what-if simulation
//!
//! Choke points are the assets and hops shared by the riskiest paths. Each
//! one maps to a concrete action with a static effort; actions are ranked
//! by impact per unit of effort and trimmed to the caller's constraints.
//! Simulation removes the chosen choke points from the subgraph and
//! re-scores the same paths.

pub mod planner;
pub mod simulate;

pub use planner::{find_choke_points, RemediationPlanner};
pub use simulate::{simulate, SimulationResult};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::{AssetId, AssetKind, RelationKind};

pub const DEFAULT_MAX_ACTIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Patch,
    FirewallRuleChange,
    EnableMfa,
    NetworkIsolate,
    RotateCredential,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Patch => "patch",
            ActionKind::FirewallRuleChange => "firewall-rule-change",
            ActionKind::EnableMfa => "enable-mfa",
            ActionKind::NetworkIsolate => "network-isolate",
            ActionKind::RotateCredential => "rotate-credential",
        }
    }

    /// Relative effort, 1.0 = a single low-risk config change
    pub fn effort(&self) -> f64 {
        match self {
            ActionKind::FirewallRuleChange => 1.0,
            ActionKind::RotateCredential => 1.0,
            ActionKind::EnableMfa => 1.5,
            ActionKind::Patch => 2.0,
            ActionKind::NetworkIsolate => 3.0,
        }
    }

    /// Action that removes an asset from an attack path
    pub fn for_asset(kind: AssetKind, has_vulnerabilities: bool) -> Self {
        match kind {
            AssetKind::Compute if has_vulnerabilities => ActionKind::Patch,
            AssetKind::Software => ActionKind::Patch,
            AssetKind::SecurityGroup => ActionKind::FirewallRuleChange,
            AssetKind::Identity => ActionKind::EnableMfa,
            AssetKind::Role | AssetKind::Policy => ActionKind::RotateCredential,
            AssetKind::Compute
            | AssetKind::Database
            | AssetKind::Storage
            | AssetKind::Subnet
            | AssetKind::Other => ActionKind::NetworkIsolate,
        }
    }

    /// Action that cuts a relationship
    pub fn for_relation(kind: RelationKind) -> Self {
        match kind {
            RelationKind::ConnectsTo
            | RelationKind::Allows
            | RelationKind::ProtectsWith
            | RelationKind::AppliesTo => ActionKind::FirewallRuleChange,
            RelationKind::Assumes => ActionKind::EnableMfa,
            RelationKind::Runs | RelationKind::HasVuln => ActionKind::Patch,
            RelationKind::Other => ActionKind::NetworkIsolate,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "patch" => Ok(ActionKind::Patch),
            "firewall-rule-change" | "firewall" => Ok(ActionKind::FirewallRuleChange),
            "enable-mfa" | "mfa" => Ok(ActionKind::EnableMfa),
            "network-isolate" | "isolate" => Ok(ActionKind::NetworkIsolate),
            "rotate-credential" | "rotate" => Ok(ActionKind::RotateCredential),
            other => Err(format!("unknown action kind '{other}'")),
        }
    }
}

/// Implementation phase, derived from effort
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Immediate,
    ShortTerm,
    MediumTerm,
}

impl Phase {
    pub fn for_effort(effort: f64) -> Self {
        if effort <= 1.0 {
            Phase::Immediate
        } else if effort <= 2.0 {
            Phase::ShortTerm
        } else {
            Phase::MediumTerm
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Immediate => "immediate",
            Phase::ShortTerm => "short-term",
            Phase::MediumTerm => "medium-term",
        }
    }
}

/// How much change the caller tolerates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BlastRadius {
    Minimal,
    Limited,
    Moderate,
}

impl BlastRadius {
    pub fn max_actions(&self) -> usize {
        match self {
            BlastRadius::Minimal => 1,
            BlastRadius::Limited => 3,
            BlastRadius::Moderate => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChokeKind {
    Node,
    Edge,
}

/// An asset or hop shared by top-ranked paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChokePoint {
    /// Asset id, or `source->target` for a hop
    pub id: String,
    pub kind: ChokeKind,
    /// Assets the removal touches (the asset, or both hop endpoints)
    pub assets: Vec<AssetId>,
    /// Share of total path risk flowing through this point, [0, 1]
    pub impact: f64,
    pub path_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub id: String,
    pub kind: ActionKind,
    pub choke_point: String,
    pub choke_kind: ChokeKind,
    pub assets: Vec<AssetId>,
    pub impact: f64,
    pub effort: f64,
    pub priority: f64,
    pub phase: Phase,
    pub rationale: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemediationConstraints {
    pub max_actions: Option<usize>,
    /// Upper bound on per-action effort
    pub max_effort: Option<f64>,
    pub blast_radius: Option<BlastRadius>,
    /// Action kinds or asset ids proposals must match
    pub actions_hint: Vec<String>,
}

impl RemediationConstraints {
    /// Effective cap on the number of actions
    pub fn action_limit(&self, default_max: usize) -> usize {
        let max = self.max_actions.unwrap_or(default_max);
        match self.blast_radius {
            Some(radius) => max.min(radius.max_actions()),
            None => max,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemediationPlan {
    pub actions: Vec<RemediationAction>,
    pub choke_points: Vec<ChokePoint>,
    /// Set when no action could be proposed
    pub infeasible: bool,
    pub estimated_timeline: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_parsing() {
        assert_eq!("enable_mfa".parse::<ActionKind>(), Ok(ActionKind::EnableMfa));
        assert_eq!("Firewall Rule Change".parse::<ActionKind>(), Ok(ActionKind::FirewallRuleChange));
        assert!("reboot".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_phase_boundaries() {
        assert_eq!(Phase::for_effort(ActionKind::FirewallRuleChange.effort()), Phase::Immediate);
        assert_eq!(Phase::for_effort(ActionKind::EnableMfa.effort()), Phase::ShortTerm);
        assert_eq!(Phase::for_effort(ActionKind::Patch.effort()), Phase::ShortTerm);
        assert_eq!(Phase::for_effort(ActionKind::NetworkIsolate.effort()), Phase::MediumTerm);
    }

    #[test]
    fn test_blast_radius_caps_actions() {
        let c = RemediationConstraints {
            blast_radius: Some(BlastRadius::Minimal),
            ..Default::default()
        };
        assert_eq!(c.action_limit(DEFAULT_MAX_ACTIONS), 1);
        let c = RemediationConstraints {
            max_actions: Some(2),
            blast_radius: Some(BlastRadius::Moderate),
            ..Default::default()
        };
        assert_eq!(c.action_limit(DEFAULT_MAX_ACTIONS), 2);
    }

    #[test]
    fn test_mapping() {
        assert_eq!(ActionKind::for_asset(AssetKind::Compute, true), ActionKind::Patch);
        assert_eq!(ActionKind::for_asset(AssetKind::Compute, false), ActionKind::NetworkIsolate);
        assert_eq!(ActionKind::for_relation(RelationKind::Assumes), ActionKind::EnableMfa);
    }
}
