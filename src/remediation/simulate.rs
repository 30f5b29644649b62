//! What-if simulation: prune the chosen choke points and re-score

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use super::{ChokeKind, RemediationAction};
use crate::graph::Subgraph;
use crate::models::{AssetId, AttackPath};

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Sum of hybrid scores before remediation
    pub original_risk: f64,
    pub simulated_risk: f64,
    /// `(original - simulated) / original`, clamped to [0, 1]
    pub risk_reduction: f64,
    pub severed_paths: usize,
    /// Paths after remediation, in input order; severed paths score 0
    pub paths: Vec<AttackPath>,
    pub affected_assets: Vec<AssetId>,
    pub recommendations: Vec<String>,
}

impl SimulationResult {
    /// Remediation must never make things look worse
    pub fn is_consistent(&self) -> bool {
        self.simulated_risk <= self.original_risk + EPSILON
    }
}

/// Remove the choke points behind `actions` and re-score `paths`.
///
/// Paths that traverse a removed asset or hop are severed and score 0.
/// The rest go through `rescore` together with the pruned subgraph, which
/// must return them in the same order.
pub fn simulate<F>(
    paths: &[AttackPath],
    actions: &[RemediationAction],
    subgraph: &Subgraph,
    rescore: F,
) -> SimulationResult
where
    F: FnOnce(Vec<AttackPath>, Arc<Subgraph>) -> Vec<AttackPath>,
{
    let mut nodes: FxHashSet<AssetId> = FxHashSet::default();
    let mut edges: FxHashSet<(AssetId, AssetId)> = FxHashSet::default();
    let mut affected: Vec<AssetId> = Vec::new();

    for action in actions {
        match action.choke_kind {
            ChokeKind::Node => {
                nodes.insert(action.choke_point.clone());
            }
            ChokeKind::Edge => {
                if let [source, target] = action.assets.as_slice() {
                    edges.insert((source.clone(), target.clone()));
                }
            }
        }
        affected.extend(action.assets.iter().cloned());
    }

    let pruned = Arc::new(subgraph.without(&nodes, &edges));

    let mut severed: Vec<usize> = Vec::new();
    let mut intact: Vec<usize> = Vec::new();
    for (i, path) in paths.iter().enumerate() {
        if pruned.is_traversable(path) {
            intact.push(i);
        } else {
            severed.push(i);
        }
    }

    let mut after: Vec<AttackPath> = paths
        .iter()
        .map(|p| {
            let mut p = p.clone();
            p.hybrid_score = 0.0;
            for v in p.scores.values_mut() {
                *v = 0.0;
            }
            p
        })
        .collect();

    if !intact.is_empty() {
        let rescored = rescore(
            intact.iter().map(|&i| paths[i].clone()).collect(),
            Arc::clone(&pruned),
        );
        for (&i, path) in intact.iter().zip(rescored) {
            after[i] = path;
        }
    }

    for &i in &severed {
        if let Some(entry) = paths[i].entry() {
            affected.push(entry.to_string());
        }
    }
    affected.sort();
    affected.dedup();

    let original_risk: f64 = paths.iter().map(|p| p.hybrid_score).sum();
    let simulated_risk: f64 = after.iter().map(|p| p.hybrid_score).sum();
    let risk_reduction = if original_risk > 0.0 {
        ((original_risk - simulated_risk) / original_risk).clamp(0.0, 1.0)
    } else {
        0.0
    };

    debug!(
        "Simulation: {} of {} paths severed, risk {:.3} -> {:.3}",
        severed.len(),
        paths.len(),
        original_risk,
        simulated_risk
    );

    SimulationResult {
        original_risk,
        simulated_risk,
        risk_reduction,
        severed_paths: severed.len(),
        recommendations: recommendations(actions, severed.len(), paths.len(), risk_reduction),
        paths: after,
        affected_assets: affected,
    }
}

fn recommendations(
    actions: &[RemediationAction],
    severed: usize,
    total: usize,
    risk_reduction: f64,
) -> Vec<String> {
    let mut out = Vec::new();
    if total > 0 && severed == total {
        out.push("All top-ranked attack paths are cut by the proposed actions".to_string());
    } else if severed > 0 {
        out.push(format!("{severed} of {total} top-ranked attack paths are cut"));
    }
    let high_impact = actions.iter().filter(|a| a.impact > 0.3).count();
    if high_impact > 0 {
        out.push(format!("{high_impact} high-impact actions identified"));
    }
    if risk_reduction < 0.1 && total > 0 {
        out.push("Risk barely moves; consider widening the blast radius".to_string());
    }
    out
}
