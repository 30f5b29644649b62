//! Path scoring
//!
//! Every scorer maps a path to [0, 1], higher meaning riskier. The
//! [`ScorerEnsemble`] runs the selected scorers over a candidate set and
//! combines them into the hybrid score.

pub mod centrality;
pub mod ensemble;
pub mod learned;
pub mod motif;
pub mod weighted_cost;

pub use centrality::CentralityScorer;
pub use ensemble::{ScoreOutcome, ScorerEnsemble, ScorerEnsembleBuilder};
pub use learned::{EdgeLikelihoodModel, LearnedScorer, LinearEdgeModel};
pub use motif::MotifScorer;
pub use weighted_cost::WeightedCostScorer;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::PathResult;
use crate::graph::Subgraph;
use crate::models::{Algorithm, AttackPath};

/// A single scoring algorithm
pub trait PathScorer: Send + Sync {
    fn algorithm(&self) -> Algorithm;

    /// Key under which the score is recorded on a path
    fn name(&self) -> &'static str {
        self.algorithm().as_str()
    }

    /// Optional scorers run under a timeout and are skipped past the deadline
    fn is_optional(&self) -> bool {
        false
    }

    fn score(&self, path: &AttackPath, subgraph: &Subgraph) -> PathResult<f64>;
}

/// Base weights of the hybrid score before renormalization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub weighted_cost: f64,
    pub centrality: f64,
    pub motif: f64,
    /// Only used when a learned model is configured
    pub learned: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            weighted_cost: 0.4,
            centrality: 0.3,
            motif: 0.3,
            learned: 0.25,
        }
    }
}

impl ScoringWeights {
    pub fn base(&self, algorithm: Algorithm) -> f64 {
        let w = match algorithm {
            Algorithm::WeightedCost => self.weighted_cost,
            Algorithm::Centrality => self.centrality,
            Algorithm::Motif => self.motif,
            Algorithm::Learned => self.learned,
            Algorithm::Hybrid => 0.0,
        };
        if w.is_finite() {
            w.max(0.0)
        } else {
            0.0
        }
    }

    /// Weights over `available`, rescaled to sum to 1.
    ///
    /// Falls back to equal weights when every base weight is zero.
    pub fn normalized(&self, available: &[Algorithm]) -> BTreeMap<String, f64> {
        if available.is_empty() {
            return BTreeMap::new();
        }
        let total: f64 = available.iter().map(|a| self.base(*a)).sum();
        available
            .iter()
            .map(|a| {
                let w = if total > 0.0 {
                    self.base(*a) / total
                } else {
                    1.0 / available.len() as f64
                };
                (a.as_str().to_string(), w)
            })
            .collect()
    }
}
