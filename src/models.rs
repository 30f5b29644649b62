//! Core data models for pathwarden
//!
//! These models are shared by the graph layer, the scoring engine, the
//! remediation planner and the workflow. All of them are plain serde types
//! so responses can be written straight to JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Asset identifiers are the stable string ids of the graph backend.
pub type AssetId = String;

/// Default for any edge feature missing from the source data
pub const DEFAULT_FEATURE: f64 = 0.5;

/// Asset types in the asset-relationship graph
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum AssetKind {
    Compute,
    Database,
    Storage,
    SecurityGroup,
    Subnet,
    Identity,
    Role,
    Policy,
    Software,
    #[default]
    Other,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Compute => "compute",
            AssetKind::Database => "database",
            AssetKind::Storage => "storage",
            AssetKind::SecurityGroup => "security-group",
            AssetKind::Subnet => "subnet",
            AssetKind::Identity => "identity",
            AssetKind::Role => "role",
            AssetKind::Policy => "policy",
            AssetKind::Software => "software",
            AssetKind::Other => "other",
        }
    }

    /// Words a user may use to refer to this kind of asset in a query.
    ///
    /// The short forms (`db`, `vm`, `sg`) match the naming used for
    /// crown jewels such as `crown-jewel-db-001`.
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            AssetKind::Compute => &["compute", "vm", "virtual machine", "server", "instance", "host"],
            AssetKind::Database => &["database", "db", "rds", "sql"],
            AssetKind::Storage => &["storage", "bucket", "s3", "blob"],
            AssetKind::SecurityGroup => &["security group", "security-group", "sg", "firewall"],
            AssetKind::Subnet => &["subnet", "network", "vpc"],
            AssetKind::Identity => &["identity", "user", "account"],
            AssetKind::Role => &["role", "iam role"],
            AssetKind::Policy => &["policy", "iam policy"],
            AssetKind::Software => &["software", "package", "service"],
            AssetKind::Other => &[],
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship types between assets
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    Runs,
    ConnectsTo,
    Allows,
    Assumes,
    ProtectsWith,
    HasVuln,
    AppliesTo,
    #[default]
    Other,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Runs => "runs",
            RelationKind::ConnectsTo => "connects-to",
            RelationKind::Allows => "allows",
            RelationKind::Assumes => "assumes",
            RelationKind::ProtectsWith => "protects-with",
            RelationKind::HasVuln => "has-vuln",
            RelationKind::AppliesTo => "applies-to",
            RelationKind::Other => "other",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A known vulnerability attached to an asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    /// CVSS base score, 0.0 - 10.0
    #[serde(default)]
    pub severity: f64,
    #[serde(default)]
    pub exploit_available: bool,
}

/// A node in the asset graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: AssetKind,
    /// Crown jewel flag
    #[serde(default)]
    pub critical: bool,
    /// Public-facing assets are the default entry points
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Asset {
    pub fn new(id: &str, kind: AssetKind) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            critical: false,
            public: false,
            vulnerabilities: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn with_vulnerability(mut self, vuln: Vulnerability) -> Self {
        self.vulnerabilities.push(vuln);
        self
    }

    /// Name if set, id otherwise
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// Whether any attached vulnerability has a public exploit
    pub fn has_exploitable_vuln(&self) -> bool {
        self.vulnerabilities.iter().any(|v| v.exploit_available)
    }

    /// Vulnerabilities sorted by severity, highest first
    pub fn worst_vulnerabilities(&self) -> Vec<&Vulnerability> {
        let mut vulns: Vec<&Vulnerability> = self.vulnerabilities.iter().collect();
        vulns.sort_by(|a, b| b.severity.total_cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));
        vulns
    }
}

/// Weight features carried by every relationship
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeFeatures {
    #[serde(default = "default_feature")]
    pub exploitability: f64,
    #[serde(default = "default_feature")]
    pub exposure: f64,
    #[serde(default = "default_feature")]
    pub privilege_gain: f64,
    #[serde(default = "default_feature")]
    pub recency: f64,
}

fn default_feature() -> f64 {
    DEFAULT_FEATURE
}

impl Default for EdgeFeatures {
    fn default() -> Self {
        Self {
            exploitability: DEFAULT_FEATURE,
            exposure: DEFAULT_FEATURE,
            privilege_gain: DEFAULT_FEATURE,
            recency: DEFAULT_FEATURE,
        }
    }
}

impl EdgeFeatures {
    pub fn new(exploitability: f64, exposure: f64, privilege_gain: f64, recency: f64) -> Self {
        Self {
            exploitability,
            exposure,
            privilege_gain,
            recency,
        }
        .clamped()
    }

    /// Force every feature into [0, 1]; NaN becomes the default.
    pub fn clamped(self) -> Self {
        fn clamp(v: f64) -> f64 {
            if v.is_nan() {
                DEFAULT_FEATURE
            } else {
                v.clamp(0.0, 1.0)
            }
        }
        Self {
            exploitability: clamp(self.exploitability),
            exposure: clamp(self.exposure),
            privilege_gain: clamp(self.privilege_gain),
            recency: clamp(self.recency),
        }
    }
}

/// A directed relationship between two assets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: AssetId,
    pub target: AssetId,
    #[serde(rename = "type", default)]
    pub kind: RelationKind,
    #[serde(flatten)]
    pub features: EdgeFeatures,
}

impl Relationship {
    pub fn new(source: &str, target: &str, kind: RelationKind) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            kind,
            features: EdgeFeatures::default(),
        }
    }

    pub fn with_features(mut self, features: EdgeFeatures) -> Self {
        self.features = features.clamped();
        self
    }
}

pub fn edge_key(source: &str, target: &str) -> String {
    format!("{source}->{target}")
}

/// A candidate attack path: a simple path from an entry point to a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackPath {
    /// Ordered asset ids, entry point first, target last
    pub nodes: Vec<AssetId>,
    pub hops: usize,
    /// Per-algorithm scores, algorithm name -> [0, 1]
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
    /// Weighted combination of the available scores, [0, 1]
    #[serde(default)]
    pub hybrid_score: f64,
}

impl AttackPath {
    pub fn new(nodes: Vec<AssetId>) -> Self {
        let hops = nodes.len().saturating_sub(1);
        Self {
            nodes,
            hops,
            scores: BTreeMap::new(),
            hybrid_score: 0.0,
        }
    }

    pub fn entry(&self) -> Option<&str> {
        self.nodes.first().map(String::as_str)
    }

    pub fn target(&self) -> Option<&str> {
        self.nodes.last().map(String::as_str)
    }

    /// Consecutive (source, target) pairs along the path
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.nodes
            .windows(2)
            .map(|w| (w[0].as_str(), w[1].as_str()))
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n == id)
    }

    pub fn contains_edge(&self, source: &str, target: &str) -> bool {
        self.edges().any(|(s, t)| s == source && t == target)
    }

    /// `a -> b -> c`
    pub fn display(&self) -> String {
        self.nodes.join(" -> ")
    }
}

/// What the user wants the workflow to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Intent {
    FindRiskiestPaths,
    RemediateRisks,
    SimulateFix,
    #[default]
    General,
}

impl Intent {
    /// Whether the workflow continues into remediation and simulation
    pub fn wants_remediation(&self) -> bool {
        matches!(self, Intent::RemediateRisks | Intent::SimulateFix)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::FindRiskiestPaths => "find-riskiest-paths",
            Intent::RemediateRisks => "remediate-risks",
            Intent::SimulateFix => "simulate-fix",
            Intent::General => "general",
        };
        f.write_str(s)
    }
}

/// Scoring algorithm requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Algorithm {
    #[default]
    Hybrid,
    WeightedCost,
    Centrality,
    Motif,
    Learned,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Hybrid => "hybrid",
            Algorithm::WeightedCost => "weighted-cost",
            Algorithm::Centrality => "centrality",
            Algorithm::Motif => "motif",
            Algorithm::Learned => "learned",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "hybrid" => Ok(Algorithm::Hybrid),
            "weighted-cost" | "dijkstra" | "cost" => Ok(Algorithm::WeightedCost),
            "centrality" | "pagerank" => Ok(Algorithm::Centrality),
            "motif" => Ok(Algorithm::Motif),
            "learned" | "gnn" => Ok(Algorithm::Learned),
            other => Err(format!(
                "unknown algorithm '{other}' (expected hybrid, weighted-cost, centrality, motif or learned)"
            )),
        }
    }
}

/// Non-fatal condition reported alongside best-effort results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    ScorerUnavailable,
    PlanningAmbiguous,
    ExplainerUnavailable,
    RemediationInfeasible,
    SimulationUnavailable,
    DeadlineExceeded,
    RetrievalRetried,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
