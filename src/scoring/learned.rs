//! Optional learned scorer
//!
//! The scoring engine never trains anything. A deployment plugs in an
//! [`EdgeLikelihoodModel`]; [`LinearEdgeModel`] covers the common case of
//! a logistic model exported as five coefficients.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::PathScorer;
use crate::errors::{PathError, PathResult};
use crate::graph::Subgraph;
use crate::models::{Algorithm, AttackPath, EdgeFeatures};

/// Likelihood that an attacker actually walks a path, in [0, 1]
pub trait EdgeLikelihoodModel: Send + Sync {
    fn name(&self) -> &str;
    fn score(&self, path: &AttackPath, subgraph: &Subgraph) -> PathResult<f64>;
}

/// Logistic model over the four edge features
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearEdgeModel {
    pub bias: f64,
    pub exploitability: f64,
    pub exposure: f64,
    pub privilege_gain: f64,
    pub recency: f64,
}

impl Default for LinearEdgeModel {
    fn default() -> Self {
        Self {
            bias: -2.0,
            exploitability: 2.5,
            exposure: 1.5,
            privilege_gain: 1.5,
            recency: 0.5,
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl LinearEdgeModel {
    pub fn edge_likelihood(&self, features: &EdgeFeatures) -> f64 {
        let f = features.clamped();
        sigmoid(
            self.bias
                + self.exploitability * f.exploitability
                + self.exposure * f.exposure
                + self.privilege_gain * f.privilege_gain
                + self.recency * f.recency,
        )
    }
}

impl EdgeLikelihoodModel for LinearEdgeModel {
    fn name(&self) -> &str {
        "linear"
    }

    /// Geometric mean of per-hop likelihoods (most likely parallel edge per hop)
    fn score(&self, path: &AttackPath, subgraph: &Subgraph) -> PathResult<f64> {
        if path.hops == 0 {
            return Ok(0.0);
        }
        let mut log_sum = 0.0;
        for (source, target) in path.edges() {
            let best = subgraph
                .edges_between(source, target)
                .into_iter()
                .map(|rel| self.edge_likelihood(&rel.features))
                .max_by(|a, b| a.total_cmp(b))
                .ok_or_else(|| PathError::ScorerUnavailable {
                    scorer: Algorithm::Learned.to_string(),
                    reason: format!("no relationship {source} -> {target} in subgraph"),
                })?;
            log_sum += best.max(f64::MIN_POSITIVE).ln();
        }
        Ok((log_sum / path.hops as f64).exp())
    }
}

/// Adapts an [`EdgeLikelihoodModel`] to the scorer contract
#[derive(Clone)]
pub struct LearnedScorer {
    model: Arc<dyn EdgeLikelihoodModel>,
}

impl LearnedScorer {
    pub fn new(model: Arc<dyn EdgeLikelihoodModel>) -> Self {
        Self { model }
    }
}

impl PathScorer for LearnedScorer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Learned
    }

    fn is_optional(&self) -> bool {
        true
    }

    fn score(&self, path: &AttackPath, subgraph: &Subgraph) -> PathResult<f64> {
        let raw = self.model.score(path, subgraph)?;
        if !raw.is_finite() {
            return Err(PathError::ScorerUnavailable {
                scorer: Algorithm::Learned.to_string(),
                reason: format!("model '{}' returned {raw}", self.model.name()),
            });
        }
        Ok(raw.clamp(0.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Asset, AssetKind, RelationKind, Relationship};

    #[test]
    fn test_linear_model_prefers_exploitable_edges() {
        let model = LinearEdgeModel::default();
        let easy = model.edge_likelihood(&EdgeFeatures::new(1.0, 1.0, 1.0, 1.0));
        let hard = model.edge_likelihood(&EdgeFeatures::new(0.0, 0.0, 0.0, 0.0));
        assert!(easy > 0.9);
        assert!(hard < 0.2);
    }

    #[test]
    fn test_geometric_mean_in_unit_range() {
        let g = Subgraph::from_parts(
            vec![
                Asset::new("e", AssetKind::Compute),
                Asset::new("m", AssetKind::Compute),
                Asset::new("t", AssetKind::Database),
            ],
            vec![
                Relationship::new("e", "m", RelationKind::ConnectsTo)
                    .with_features(EdgeFeatures::new(0.9, 0.9, 0.2, 0.5)),
                Relationship::new("m", "t", RelationKind::ConnectsTo),
            ],
        );
        let scorer = LearnedScorer::new(Arc::new(LinearEdgeModel::default()));
        let path = AttackPath::new(vec!["e".into(), "m".into(), "t".into()]);
        let s = scorer.score(&path, &g).unwrap();
        assert!(s > 0.0 && s < 1.0);
        assert!(scorer.is_optional());
    }
}
