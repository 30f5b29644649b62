// Graph algorithms over retrieved subgraphs
//
// PAGERANK:
// Each node starts with 1/N. On every iteration a node keeps the
// "random jump" share (1 - d)/N and receives d * score/out_degree from
// every node linking to it. Nodes without outgoing edges (crown jewels
// usually are sinks) spread their score evenly over the graph, otherwise
// the total mass leaks away and scores stop summing to 1.
//
// Score updates are independent per node within an iteration, so they
// run in parallel with rayon.
//
// Time complexity: O(iterations * (V + E))

use rayon::prelude::*;

use crate::errors::PathError;

pub const DEFAULT_DAMPING: f64 = 0.85;
pub const DEFAULT_MAX_ITERATIONS: usize = 100;
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Validate that all edges reference valid node indices.
fn validate_edges(edges: &[(u32, u32)], num_nodes: usize) -> Result<(), PathError> {
    for &(src, dst) in edges {
        if src as usize >= num_nodes || dst as usize >= num_nodes {
            return Err(PathError::InvalidRequest(format!(
                "edge ({src}, {dst}) references a node outside 0..{num_nodes}"
            )));
        }
    }
    Ok(())
}

/// PageRank over `num_nodes` nodes indexed `0..num_nodes`.
///
/// `damping` must lie in [0, 1] and `tolerance` (L1 change between
/// iterations) must be positive. The result is indexed by node and sums to 1.
pub fn pagerank(
    edges: &[(u32, u32)],
    num_nodes: usize,
    damping: f64,
    max_iterations: usize,
    tolerance: f64,
) -> Result<Vec<f64>, PathError> {
    if num_nodes == 0 {
        return Ok(vec![]);
    }
    if !(0.0..=1.0).contains(&damping) {
        return Err(PathError::InvalidRequest(format!(
            "damping must be in [0, 1], got {damping}"
        )));
    }
    if tolerance <= 0.0 {
        return Err(PathError::InvalidRequest(format!(
            "tolerance must be positive, got {tolerance}"
        )));
    }
    validate_edges(edges, num_nodes)?;

    let mut incoming: Vec<Vec<u32>> = vec![vec![]; num_nodes];
    let mut out_degree: Vec<usize> = vec![0; num_nodes];
    for &(src, dst) in edges {
        incoming[dst as usize].push(src);
        out_degree[src as usize] += 1;
    }

    let n = num_nodes as f64;
    let mut scores: Vec<f64> = vec![1.0 / n; num_nodes];
    let base_score = (1.0 - damping) / n;

    for _ in 0..max_iterations {
        let dangling: f64 = scores
            .iter()
            .zip(&out_degree)
            .filter(|(_, &deg)| deg == 0)
            .map(|(s, _)| s)
            .sum();
        let dangling_share = damping * dangling / n;

        let new_scores: Vec<f64> = (0..num_nodes)
            .into_par_iter()
            .map(|node| {
                let mut score = base_score + dangling_share;
                for &neighbor in &incoming[node] {
                    let neighbor = neighbor as usize;
                    score += damping * scores[neighbor] / out_degree[neighbor] as f64;
                }
                score
            })
            .collect();

        let diff: f64 = scores
            .par_iter()
            .zip(new_scores.par_iter())
            .map(|(old, new)| (old - new).abs())
            .sum();

        scores = new_scores;
        if diff < tolerance {
            break;
        }
    }

    Ok(scores)
}
