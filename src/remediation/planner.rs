//! Choke point discovery and action proposal

use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;
use tracing::{debug, info};

use super::{
    ActionKind, ChokeKind, ChokePoint, Phase, RemediationAction, RemediationConstraints,
    RemediationPlan, DEFAULT_MAX_ACTIONS,
};
use crate::graph::Subgraph;
use crate::models::{edge_key, AssetId, AttackPath};

/// Every asset and hop of `paths`, weighted by the risk flowing through it.
///
/// Path targets are never choke points: the crown jewel itself cannot be
/// removed. When every path scores zero, impact falls back to the share of
/// paths through the point.
pub fn find_choke_points(paths: &[AttackPath]) -> Vec<ChokePoint> {
    let targets: FxHashSet<&str> = paths.iter().filter_map(|p| p.target()).collect();
    let total: f64 = paths.iter().map(|p| p.hybrid_score).sum();
    let weight = |p: &AttackPath| if total > 0.0 { p.hybrid_score } else { 1.0 };
    let denom = if total > 0.0 { total } else { paths.len() as f64 };

    // id -> (kind, assets, weight sum, path count)
    let mut acc: FxHashMap<String, (ChokeKind, Vec<AssetId>, f64, usize)> = FxHashMap::default();

    for path in paths {
        let w = weight(path);
        let mut seen: FxHashSet<String> = FxHashSet::default();

        for node in &path.nodes {
            if targets.contains(node.as_str()) || !seen.insert(node.clone()) {
                continue;
            }
            let entry = acc
                .entry(node.clone())
                .or_insert_with(|| (ChokeKind::Node, vec![node.clone()], 0.0, 0));
            entry.2 += w;
            entry.3 += 1;
        }
        for (source, target) in path.edges() {
            let key = edge_key(source, target);
            if !seen.insert(key.clone()) {
                continue;
            }
            let entry = acc.entry(key).or_insert_with(|| {
                (ChokeKind::Edge, vec![source.to_string(), target.to_string()], 0.0, 0)
            });
            entry.2 += w;
            entry.3 += 1;
        }
    }

    let mut points: Vec<ChokePoint> = acc
        .into_iter()
        .map(|(id, (kind, assets, sum, count))| ChokePoint {
            id,
            kind,
            assets,
            impact: if denom > 0.0 { (sum / denom).clamp(0.0, 1.0) } else { 0.0 },
            path_count: count,
        })
        .collect();
    points.sort_by(|a, b| {
        b.impact
            .total_cmp(&a.impact)
            .then_with(|| a.id.cmp(&b.id))
    });
    points
}

#[derive(Debug, Clone, Copy)]
pub struct RemediationPlanner {
    max_actions: usize,
}

impl Default for RemediationPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ACTIONS)
    }
}

impl RemediationPlanner {
    pub fn new(max_actions: usize) -> Self {
        Self { max_actions }
    }

    /// Propose actions for the top-ranked `paths`.
    pub fn plan(
        &self,
        paths: &[AttackPath],
        subgraph: &Subgraph,
        constraints: &RemediationConstraints,
    ) -> RemediationPlan {
        let choke_points = find_choke_points(paths);
        if choke_points.is_empty() {
            info!("No choke points in {} paths, remediation infeasible", paths.len());
            return RemediationPlan {
                infeasible: true,
                estimated_timeline: estimate_timeline(&[]),
                ..Default::default()
            };
        }

        let hints = Hints::parse(&constraints.actions_hint);
        let mut actions: Vec<RemediationAction> = choke_points
            .iter()
            .map(|cp| propose(cp, subgraph))
            .filter(|a| hints.admits(a))
            .filter(|a| constraints.max_effort.map_or(true, |max| a.effort <= max))
            .collect();

        actions.sort_by(compare_actions);
        let limit = constraints.action_limit(self.max_actions);
        actions.truncate(limit);
        for (i, action) in actions.iter_mut().enumerate() {
            action.id = format!("REM-{:03}", i + 1);
        }

        debug!(
            "{} choke points, {} actions after constraints (limit {})",
            choke_points.len(),
            actions.len(),
            limit
        );

        RemediationPlan {
            infeasible: actions.is_empty(),
            estimated_timeline: estimate_timeline(&actions),
            actions,
            choke_points,
        }
    }
}

/// Priority descending; ties to higher impact, then choke point id
fn compare_actions(a: &RemediationAction, b: &RemediationAction) -> Ordering {
    b.priority
        .total_cmp(&a.priority)
        .then_with(|| b.impact.total_cmp(&a.impact))
        .then_with(|| a.choke_point.cmp(&b.choke_point))
}

fn propose(cp: &ChokePoint, subgraph: &Subgraph) -> RemediationAction {
    let (kind, rationale) = match cp.kind {
        ChokeKind::Node => {
            let asset = subgraph.asset(&cp.id);
            let kind = asset
                .map(|a| ActionKind::for_asset(a.kind, !a.vulnerabilities.is_empty()))
                .unwrap_or(ActionKind::NetworkIsolate);
            let detail = match (kind, asset) {
                (ActionKind::Patch, Some(a)) => {
                    let cves: Vec<&str> = a
                        .worst_vulnerabilities()
                        .into_iter()
                        .take(3)
                        .map(|v| v.id.as_str())
                        .collect();
                    if cves.is_empty() {
                        format!("patch {}", a.display_name())
                    } else {
                        format!("patch {} ({})", a.display_name(), cves.join(", "))
                    }
                }
                (_, Some(a)) => format!("{} {} ({})", kind, a.display_name(), a.kind),
                (_, None) => format!("{} {}", kind, cp.id),
            };
            (kind, detail)
        }
        ChokeKind::Edge => {
            let (source, target) = (&cp.assets[0], &cp.assets[1]);
            let mut kinds: Vec<_> = subgraph
                .edges_between(source, target)
                .iter()
                .map(|r| r.kind)
                .collect();
            kinds.sort();
            let kind = kinds
                .first()
                .map(|k| ActionKind::for_relation(*k))
                .unwrap_or(ActionKind::FirewallRuleChange);
            let relation = kinds.first().map(|k| k.as_str()).unwrap_or("link");
            (kind, format!("{kind} to cut {relation} {source} -> {target}"))
        }
    };

    let effort = kind.effort();
    RemediationAction {
        id: String::new(),
        kind,
        choke_point: cp.id.clone(),
        choke_kind: cp.kind,
        assets: cp.assets.clone(),
        impact: cp.impact,
        effort,
        priority: cp.impact / effort,
        phase: Phase::for_effort(effort),
        rationale: format!(
            "{}: on {} of the top paths, {:.0}% of their combined risk",
            rationale,
            cp.path_count,
            cp.impact * 100.0
        ),
    }
}

/// Caller hints: action kinds or asset ids
struct Hints {
    kinds: Vec<ActionKind>,
    assets: Vec<String>,
}

impl Hints {
    fn parse(raw: &[String]) -> Self {
        let mut kinds = Vec::new();
        let mut assets = Vec::new();
        for hint in raw {
            match hint.parse::<ActionKind>() {
                Ok(kind) => kinds.push(kind),
                Err(_) => assets.push(hint.trim().to_string()),
            }
        }
        Self { kinds, assets }
    }

    fn admits(&self, action: &RemediationAction) -> bool {
        if self.kinds.is_empty() && self.assets.is_empty() {
            return true;
        }
        self.kinds.contains(&action.kind)
            || self
                .assets
                .iter()
                .any(|h| *h == action.choke_point || action.assets.contains(h))
    }
}

fn estimate_timeline(actions: &[RemediationAction]) -> String {
    let latest = actions.iter().map(|a| a.phase).max();
    match latest {
        None => "nothing to schedule",
        Some(Phase::Immediate) => "immediate - 1 week",
        Some(Phase::ShortTerm) => "1-2 weeks",
        Some(Phase::MediumTerm) => "2-4 weeks",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Asset, AssetKind, RelationKind, Relationship, Vulnerability};
    use crate::remediation::BlastRadius;

    fn setup() -> (Subgraph, Vec<AttackPath>) {
        let g = Subgraph::from_parts(
            vec![
                Asset::new("e1", AssetKind::Compute).public(),
                Asset::new("e2", AssetKind::Compute).public(),
                Asset::new("hub", AssetKind::Compute).with_vulnerability(Vulnerability {
                    id: "CVE-2023-1111".into(),
                    severity: 9.1,
                    exploit_available: true,
                }),
                Asset::new("sg", AssetKind::SecurityGroup),
                Asset::new("db", AssetKind::Database).critical(),
            ],
            vec![
                Relationship::new("e1", "hub", RelationKind::ConnectsTo),
                Relationship::new("e2", "hub", RelationKind::ConnectsTo),
                Relationship::new("hub", "db", RelationKind::ConnectsTo),
                Relationship::new("e2", "sg", RelationKind::ProtectsWith),
                Relationship::new("sg", "db", RelationKind::Allows),
            ],
        );
        let mut paths = vec![
            AttackPath::new(vec!["e1".into(), "hub".into(), "db".into()]),
            AttackPath::new(vec!["e2".into(), "hub".into(), "db".into()]),
            AttackPath::new(vec!["e2".into(), "sg".into(), "db".into()]),
        ];
        paths[0].hybrid_score = 0.6;
        paths[1].hybrid_score = 0.3;
        paths[2].hybrid_score = 0.1;
        (g, paths)
    }

    #[test]
    fn test_choke_points_exclude_target() {
        let (_, paths) = setup();
        let points = find_choke_points(&paths);
        assert!(points.iter().all(|p| p.id != "db"));
        let hub = points.iter().find(|p| p.id == "hub").unwrap();
        assert!((hub.impact - 0.9).abs() < 1e-9);
        assert_eq!(hub.path_count, 2);
        let edge = points.iter().find(|p| p.id == "hub->db").unwrap();
        assert_eq!(edge.kind, ChokeKind::Edge);
    }

    #[test]
    fn test_actions_ordered_by_priority() {
        let (g, paths) = setup();
        let plan = RemediationPlanner::default().plan(&paths, &g, &RemediationConstraints::default());
        assert!(!plan.infeasible);
        assert_eq!(plan.actions.len(), 5);
        // hub->db firewall change: impact 0.9, effort 1.0
        assert_eq!(plan.actions[0].choke_point, "hub->db");
        assert_eq!(plan.actions[0].kind, ActionKind::FirewallRuleChange);
        assert_eq!(plan.actions[0].id, "REM-001");
        for pair in plan.actions.windows(2) {
            assert!(pair[0].priority >= pair[1].priority);
        }
    }

    #[test]
    fn test_hints_restrict_actions() {
        let (g, paths) = setup();
        let constraints = RemediationConstraints {
            actions_hint: vec!["patch".into()],
            ..Default::default()
        };
        let plan = RemediationPlanner::default().plan(&paths, &g, &constraints);
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].choke_point, "hub");
        assert!(plan.actions[0].rationale.contains("CVE-2023-1111"));

        let constraints = RemediationConstraints {
            actions_hint: vec!["sg".into()],
            ..Default::default()
        };
        let plan = RemediationPlanner::default().plan(&paths, &g, &constraints);
        assert!(plan.actions.iter().all(|a| a.assets.contains(&"sg".to_string())));
    }

    #[test]
    fn test_constraints_and_infeasible() {
        let (g, paths) = setup();
        let constraints = RemediationConstraints {
            blast_radius: Some(BlastRadius::Minimal),
            ..Default::default()
        };
        let plan = RemediationPlanner::default().plan(&paths, &g, &constraints);
        assert_eq!(plan.actions.len(), 1);

        let constraints = RemediationConstraints {
            max_effort: Some(0.5),
            ..Default::default()
        };
        let plan = RemediationPlanner::default().plan(&paths, &g, &constraints);
        assert!(plan.infeasible);

        let plan = RemediationPlanner::default().plan(&[], &g, &RemediationConstraints::default());
        assert!(plan.infeasible);
        assert!(plan.choke_points.is_empty());
    }
}
