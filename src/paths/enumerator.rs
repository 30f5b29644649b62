//! Bounded simple-path enumeration
//!
//! Paths are generated breadth-first by hop count, so when the candidate
//! cap cuts enumeration short every shorter path has already been
//! produced. Within a hop count, entry points and successors are visited
//! in sorted id order, which makes the output order a pure function of
//! the subgraph.

use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use tracing::debug;

use crate::graph::Subgraph;
use crate::models::{AssetId, AttackPath};

pub const DEFAULT_CANDIDATE_CAP: usize = 500;

#[derive(Debug, Clone, Copy)]
pub struct PathEnumerator {
    max_hops: usize,
    candidate_cap: usize,
}

impl PathEnumerator {
    pub fn new(max_hops: usize, candidate_cap: usize) -> Self {
        Self {
            max_hops,
            candidate_cap: candidate_cap.max(1),
        }
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// All simple paths from any entry point to `target`, at most
    /// `max_hops` long and at most `candidate_cap` of them.
    pub fn enumerate(
        &self,
        subgraph: &Subgraph,
        entry_points: &[AssetId],
        target: &str,
    ) -> Vec<AttackPath> {
        if self.max_hops == 0 || !subgraph.contains(target) {
            return Vec::new();
        }

        let mut entries: Vec<&str> = entry_points
            .iter()
            .map(String::as_str)
            .filter(|id| *id != target && subgraph.contains(id))
            .collect();
        entries.sort_unstable();
        entries.dedup();

        let remaining = distances_to(subgraph, target, self.max_hops);

        let mut frontier: Vec<Vec<&str>> = entries
            .into_iter()
            .filter(|id| remaining.contains_key(id))
            .map(|id| vec![id])
            .collect();
        let mut found: Vec<AttackPath> = Vec::new();

        'levels: for hop in 1..=self.max_hops {
            let hops_left = self.max_hops - hop;
            let mut next: Vec<Vec<&str>> = Vec::new();

            for partial in &frontier {
                let Some(&last) = partial.last() else {
                    continue;
                };
                for succ in subgraph.successors(last) {
                    if partial.contains(&succ) {
                        continue;
                    }
                    if succ == target {
                        let mut nodes: Vec<AssetId> =
                            partial.iter().map(|s| s.to_string()).collect();
                        nodes.push(succ.to_string());
                        found.push(AttackPath::new(nodes));
                        if found.len() >= self.candidate_cap {
                            debug!("Candidate cap {} reached at {} hops", self.candidate_cap, hop);
                            break 'levels;
                        }
                        continue;
                    }
                    // Only extend toward nodes that can still reach the target in time
                    match remaining.get(succ) {
                        Some(&dist) if dist <= hops_left => {
                            let mut extended = partial.clone();
                            extended.push(succ);
                            next.push(extended);
                        }
                        _ => {}
                    }
                }
            }

            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        debug!("Enumerated {} candidate paths to '{}'", found.len(), target);
        found
    }

    /// Candidates toward several targets, shortest first, capped as a whole
    pub fn enumerate_targets(
        &self,
        subgraph: &Subgraph,
        entry_points: &[AssetId],
        targets: &[AssetId],
    ) -> Vec<AttackPath> {
        let mut targets: Vec<&str> = targets.iter().map(String::as_str).collect();
        targets.sort_unstable();
        targets.dedup();

        let mut all: Vec<AttackPath> = targets
            .into_iter()
            .flat_map(|t| self.enumerate(subgraph, entry_points, t))
            .collect();
        all.sort_by(|a, b| a.hops.cmp(&b.hops).then_with(|| a.nodes.cmp(&b.nodes)));
        all.truncate(self.candidate_cap);
        all
    }
}

/// Hop distance from each node to `target` along edge direction, up to `limit`
fn distances_to<'a>(subgraph: &'a Subgraph, target: &'a str, limit: usize) -> FxHashMap<&'a str, usize> {
    let mut dist: FxHashMap<&str, usize> = FxHashMap::default();
    let mut queue: VecDeque<&str> = VecDeque::new();
    dist.insert(target, 0);
    queue.push_back(target);
    while let Some(id) = queue.pop_front() {
        let d = dist[id];
        if d == limit {
            continue;
        }
        for pred in subgraph.predecessors(id) {
            if !dist.contains_key(pred) {
                dist.insert(pred, d + 1);
                queue.push_back(pred);
            }
        }
    }
    dist
}
