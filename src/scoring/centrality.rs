//! Centrality scorer: mean PageRank importance of the path's nodes,
//! relative to the most important node of the subgraph.

use super::PathScorer;
use crate::errors::{PathError, PathResult};
use crate::graph::Subgraph;
use crate::models::{Algorithm, AttackPath};

#[derive(Debug, Default, Clone, Copy)]
pub struct CentralityScorer;

impl PathScorer for CentralityScorer {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Centrality
    }

    fn score(&self, path: &AttackPath, subgraph: &Subgraph) -> PathResult<f64> {
        if path.nodes.is_empty() {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for id in &path.nodes {
            total += subgraph
                .importance(id)
                .ok_or_else(|| PathError::ScorerUnavailable {
                    scorer: Algorithm::Centrality.to_string(),
                    reason: format!("asset '{id}' not in subgraph"),
                })?;
        }
        Ok((total / path.nodes.len() as f64).clamp(0.0, 1.0))
    }
}
