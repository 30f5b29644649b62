//! Deterministic top-K selection

use std::cmp::Ordering;

use crate::models::AttackPath;

pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, Copy)]
pub struct Ranker {
    k: usize,
}

impl Default for Ranker {
    fn default() -> Self {
        Self { k: DEFAULT_TOP_K }
    }
}

impl Ranker {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    /// Highest hybrid score first; ties go to fewer hops, then to the
    /// lexicographically smaller node sequence.
    pub fn compare(a: &AttackPath, b: &AttackPath) -> Ordering {
        b.hybrid_score
            .total_cmp(&a.hybrid_score)
            .then_with(|| a.hops.cmp(&b.hops))
            .then_with(|| a.nodes.cmp(&b.nodes))
    }

    /// Sorted copy of the best `k` paths. The input order does not matter.
    pub fn rank(&self, paths: &[AttackPath]) -> Vec<AttackPath> {
        let mut ranked = paths.to_vec();
        ranked.sort_by(Self::compare);
        ranked.truncate(self.k);
        ranked
    }
}
