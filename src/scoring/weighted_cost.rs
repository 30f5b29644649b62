//! Weighted-cost scorer
//!
//! Each hop costs `1 - (0.4*exploitability + 0.3*exposure + 0.3*privilege_gain)`,
//! so an easy, exposed, privilege-granting hop is nearly free. The path
//! score is `1 / (1 + total cost)`: cheaper paths score higher, and with
//! equal per-hop cost a shorter path always beats a longer one.

use super::PathScorer;
use crate::errors::{PathError, PathResult};
use crate::graph::Subgraph;
use crate::models::{Algorithm, AttackPath, EdgeFeatures};

const W_EXPLOITABILITY: f64 = 0.4;
const W_EXPOSURE: f64 = 0.3;
const W_PRIVILEGE_GAIN: f64 = 0.3;

pub fn edge_cost(features: &EdgeFeatures) -> f64 {
    let f = features.clamped();
    let ease = W_EXPLOITABILITY * f.exploitability
        + W_EXPOSURE * f.exposure
        + W_PRIVILEGE_GAIN * f.privilege_gain;
    (1.0 - ease).clamp(0.0, 1.0)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedCostScorer;

impl WeightedCostScorer {
    /// Sum of hop costs, taking the cheapest of any parallel edges
    pub fn path_cost(path: &AttackPath, subgraph: &Subgraph) -> PathResult<f64> {
        let mut total = 0.0;
        for (source, target) in path.edges() {
            let cheapest = subgraph
                .edges_between(source, target)
                .into_iter()
                .map(|rel| edge_cost(&rel.features))
                .min_by(|a, b| a.total_cmp(b))
                .ok_or_else(|| PathError::ScorerUnavailable {
                    scorer: Algorithm::WeightedCost.to_string(),
                    reason: format!("no relationship {source} -> {target} in subgraph"),
                })?;
            total += cheapest;
        }
        Ok(total)
    }
}

impl PathScorer for WeightedCostScorer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::WeightedCost
    }

    fn score(&self, path: &AttackPath, subgraph: &Subgraph) -> PathResult<f64> {
        let cost = Self::path_cost(path, subgraph)?;
        Ok(1.0 / (1.0 + cost))
    }
}
