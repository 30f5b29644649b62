//! Motif scorer: how closely a path's hop sequence follows a known
//! attack pattern.
//!
//! Every hop is classified against the pattern steps it can stand for (a
//! hop can stand for several). Each template is compared with the hop
//! sequence by edit distance where a substitution is free when the hop
//! stands for the template step. The score is
//! `max(0, 1 - penalty * distance)` for the best template.

use super::PathScorer;
use crate::errors::{PathError, PathResult};
use crate::graph::Subgraph;
use crate::models::{Algorithm, AssetKind, AttackPath, RelationKind};

pub const DEFAULT_MOTIF_PENALTY: f64 = 0.25;

/// A single hop of an attack pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotifStep {
    /// Leaves a public-facing asset
    PublicIngress,
    /// Lands on an asset carrying a vulnerability
    VulnerableSoftware,
    /// Network movement between assets
    LateralConnect,
    /// Assumes a role or identity
    AssumeRole,
    /// Gains rights through a policy
    PolicyGrant,
    /// Lands on a crown jewel
    CrownJewel,
    /// Moves data out of a database into a critical bucket or host
    DataExfiltration,
}

#[derive(Debug, Clone)]
pub struct MotifTemplate {
    pub name: &'static str,
    pub steps: &'static [MotifStep],
}

pub fn default_library() -> Vec<MotifTemplate> {
    use MotifStep::*;
    vec![
        MotifTemplate {
            name: "public-vuln-lateral",
            steps: &[PublicIngress, VulnerableSoftware, LateralConnect, CrownJewel],
        },
        MotifTemplate {
            name: "privilege-escalation",
            steps: &[AssumeRole, PolicyGrant, CrownJewel],
        },
        MotifTemplate {
            name: "data-exfiltration",
            steps: &[LateralConnect, DataExfiltration],
        },
        MotifTemplate {
            name: "lateral-chain",
            steps: &[LateralConnect, LateralConnect, CrownJewel],
        },
        MotifTemplate {
            name: "direct-exposure",
            steps: &[PublicIngress, CrownJewel],
        },
    ]
}

/// Steps a single hop `source -> target` can stand for
fn classify_hop(subgraph: &Subgraph, source: &str, target: &str) -> PathResult<Vec<MotifStep>> {
    let (Some(src), Some(dst)) = (subgraph.asset(source), subgraph.asset(target)) else {
        return Err(PathError::ScorerUnavailable {
            scorer: Algorithm::Motif.to_string(),
            reason: format!("hop {source} -> {target} not in subgraph"),
        });
    };
    let kinds: Vec<RelationKind> = subgraph
        .edges_between(source, target)
        .iter()
        .map(|r| r.kind)
        .collect();
    let has = |k: RelationKind| kinds.contains(&k);

    let mut steps = Vec::new();
    if src.public {
        steps.push(MotifStep::PublicIngress);
    }
    if !dst.vulnerabilities.is_empty() || has(RelationKind::HasVuln) {
        steps.push(MotifStep::VulnerableSoftware);
    }
    if has(RelationKind::ConnectsTo) || has(RelationKind::Allows) {
        steps.push(MotifStep::LateralConnect);
    }
    if has(RelationKind::Assumes) || matches!(dst.kind, AssetKind::Role | AssetKind::Identity) {
        steps.push(MotifStep::AssumeRole);
    }
    if has(RelationKind::AppliesTo) || src.kind == AssetKind::Policy || dst.kind == AssetKind::Policy {
        steps.push(MotifStep::PolicyGrant);
    }
    if dst.critical {
        steps.push(MotifStep::CrownJewel);
        if src.kind == AssetKind::Database && matches!(dst.kind, AssetKind::Storage | AssetKind::Compute) {
            steps.push(MotifStep::DataExfiltration);
        }
    }
    Ok(steps)
}

/// Edit distance between classified hops and template steps
fn distance(hops: &[Vec<MotifStep>], steps: &[MotifStep]) -> usize {
    let (n, m) = (hops.len(), steps.len());
    let mut prev: Vec<usize> = (0..=m).collect();
    let mut cur = vec![0usize; m + 1];
    for i in 1..=n {
        cur[0] = i;
        for j in 1..=m {
            let sub = if hops[i - 1].contains(&steps[j - 1]) { 0 } else { 1 };
            cur[j] = (prev[j - 1] + sub).min(prev[j] + 1).min(cur[j - 1] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[m]
}

#[derive(Debug, Clone)]
pub struct MotifScorer {
    library: Vec<MotifTemplate>,
    penalty: f64,
}

impl Default for MotifScorer {
    fn default() -> Self {
        Self::new(DEFAULT_MOTIF_PENALTY)
    }
}

impl MotifScorer {
    pub fn new(penalty: f64) -> Self {
        Self {
            library: default_library(),
            penalty: penalty.clamp(0.0, 1.0),
        }
    }

    /// Best-matching template and its score
    pub fn best_match(&self, path: &AttackPath, subgraph: &Subgraph) -> PathResult<(&'static str, f64)> {
        let hops = path
            .edges()
            .map(|(s, t)| classify_hop(subgraph, s, t))
            .collect::<PathResult<Vec<_>>>()?;

        let mut best = ("none", 0.0);
        for template in &self.library {
            let d = distance(&hops, template.steps);
            let score = (1.0 - self.penalty * d as f64).max(0.0);
            if score > best.1 {
                best = (template.name, score);
            }
        }
        Ok(best)
    }
}

impl PathScorer for MotifScorer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Motif
    }

    fn score(&self, path: &AttackPath, subgraph: &Subgraph) -> PathResult<f64> {
        self.best_match(path, subgraph).map(|(_, score)| score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Asset, Relationship, Vulnerability};

    fn graph() -> Subgraph {
        Subgraph::from_parts(
            vec![
                Asset::new("web", AssetKind::Compute).public(),
                Asset::new("lb", AssetKind::Compute),
                Asset::new("app", AssetKind::Software).with_vulnerability(Vulnerability {
                    id: "CVE-2024-0001".into(),
                    severity: 9.8,
                    exploit_available: true,
                }),
                Asset::new("jump", AssetKind::Compute),
                Asset::new("role", AssetKind::Role),
                Asset::new("pol", AssetKind::Policy),
                Asset::new("db", AssetKind::Database).critical(),
                Asset::new("backups", AssetKind::Storage).critical(),
                Asset::new("archive", AssetKind::Storage),
            ],
            vec![
                Relationship::new("web", "lb", RelationKind::ConnectsTo),
                Relationship::new("lb", "app", RelationKind::ConnectsTo),
                Relationship::new("app", "jump", RelationKind::ConnectsTo),
                Relationship::new("jump", "db", RelationKind::ConnectsTo),
                Relationship::new("lb", "db", RelationKind::ConnectsTo),
                Relationship::new("jump", "role", RelationKind::Assumes),
                Relationship::new("role", "pol", RelationKind::AppliesTo),
                Relationship::new("pol", "db", RelationKind::Allows),
                Relationship::new("db", "backups", RelationKind::ConnectsTo),
                Relationship::new("db", "archive", RelationKind::ConnectsTo),
            ],
        )
    }

    fn p(nodes: &[&str]) -> AttackPath {
        AttackPath::new(nodes.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_exact_matches_score_one() {
        let g = graph();
        let scorer = MotifScorer::default();
        let (name, score) = scorer.best_match(&p(&["web", "lb", "app", "jump", "db"]), &g).unwrap();
        assert_eq!(name, "public-vuln-lateral");
        assert_eq!(score, 1.0);

        let (name, score) = scorer.best_match(&p(&["web", "lb", "db"]), &g).unwrap();
        assert_eq!(name, "direct-exposure");
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_database_into_critical_bucket_is_exfiltration() {
        let g = graph();
        let (name, score) = MotifScorer::default()
            .best_match(&p(&["lb", "db", "backups"]), &g)
            .unwrap();
        assert_eq!(name, "data-exfiltration");
        assert_eq!(score, 1.0);

        let steps = classify_hop(&g, "db", "archive").unwrap();
        assert!(!steps.contains(&MotifStep::DataExfiltration));
        let steps = classify_hop(&g, "lb", "db").unwrap();
        assert!(!steps.contains(&MotifStep::DataExfiltration));
    }

    #[test]
    fn test_penalty_per_edit() {
        let g = graph();
        // jump -> role -> pol -> db: assume, policy, crown jewel
        let s = MotifScorer::default().score(&p(&["jump", "role", "pol", "db"]), &g).unwrap();
        assert_eq!(s, 1.0);
        // One extra leading hop costs one penalty
        let s = MotifScorer::default()
            .score(&p(&["app", "jump", "role", "pol", "db"]), &g)
            .unwrap();
        assert!((s - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_score_floor_zero() {
        let g = graph();
        let s = MotifScorer::new(1.0).score(&p(&["app", "jump", "role"]), &g).unwrap();
        assert!(s >= 0.0);
    }

    #[test]
    fn test_distance_basics() {
        use MotifStep::*;
        assert_eq!(distance(&[], &[CrownJewel]), 1);
        assert_eq!(distance(&[vec![CrownJewel]], &[CrownJewel]), 0);
        assert_eq!(distance(&[vec![LateralConnect], vec![CrownJewel]], &[CrownJewel]), 1);
    }
}
