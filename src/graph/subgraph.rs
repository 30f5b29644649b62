//! Bounded subgraph handed from retrieval to enumeration and scoring
//!
//! A `Subgraph` is an immutable petgraph `DiGraph` plus an id lookup.
//! Node importance (PageRank) is computed lazily once per subgraph and
//! shared by every path scored against it.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::OnceLock;
use tracing::debug;

use super::algo::{pagerank, DEFAULT_DAMPING, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};
use crate::models::{Asset, AssetId, AttackPath, RelationKind, Relationship};

#[derive(Debug, Clone, Default)]
pub struct Subgraph {
    graph: DiGraph<Asset, Relationship>,
    index: FxHashMap<AssetId, NodeIndex>,
    /// Normalized PageRank (max = 1.0), indexed by NodeIndex
    importance: OnceLock<Vec<f64>>,
}

impl Subgraph {
    /// Build a subgraph from assets and relationships.
    ///
    /// Relationships whose endpoints are not among `assets` are dropped.
    /// A repeated asset id keeps the last definition.
    pub fn from_parts(assets: Vec<Asset>, relationships: Vec<Relationship>) -> Self {
        let mut graph = DiGraph::with_capacity(assets.len(), relationships.len());
        let mut index: FxHashMap<AssetId, NodeIndex> = FxHashMap::default();

        for asset in assets {
            if let Some(&idx) = index.get(&asset.id) {
                if let Some(existing) = graph.node_weight_mut(idx) {
                    *existing = asset;
                }
                continue;
            }
            let id = asset.id.clone();
            let idx = graph.add_node(asset);
            index.insert(id, idx);
        }

        let mut dropped = 0usize;
        for rel in relationships {
            match (index.get(&rel.source), index.get(&rel.target)) {
                (Some(&from), Some(&to)) => {
                    let rel = Relationship {
                        features: rel.features.clamped(),
                        ..rel
                    };
                    graph.add_edge(from, to, rel);
                }
                _ => dropped += 1,
            }
        }
        if dropped > 0 {
            debug!("Dropped {} relationships with endpoints outside the subgraph", dropped);
        }

        Self {
            graph,
            index,
            importance: OnceLock::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn asset(&self, id: &str) -> Option<&Asset> {
        self.index.get(id).and_then(|&idx| self.graph.node_weight(idx))
    }

    pub fn assets(&self) -> impl Iterator<Item = &Asset> {
        self.graph.node_weights()
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.graph.edge_weights()
    }

    /// Distinct successor ids of `id`, sorted
    pub fn successors(&self, id: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .filter_map(|n| self.graph.node_weight(n))
            .map(|a| a.id.as_str())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Distinct predecessor ids of `id`, sorted
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .filter_map(|n| self.graph.node_weight(n))
            .map(|a| a.id.as_str())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// All relationships from `source` to `target` (parallel edges included)
    pub fn edges_between(&self, source: &str, target: &str) -> Vec<&Relationship> {
        let (Some(&from), Some(&to)) = (self.index.get(source), self.index.get(target)) else {
            return Vec::new();
        };
        self.graph
            .edges_connecting(from, to)
            .map(|e| e.weight())
            .collect()
    }

    /// Whether every node and every hop of `path` is still present
    pub fn is_traversable(&self, path: &AttackPath) -> bool {
        path.nodes.iter().all(|n| self.contains(n))
            && path
                .edges()
                .all(|(s, t)| !self.edges_between(s, t).is_empty())
    }

    /// Normalized importance of a node, in [0, 1] (1.0 = most central)
    pub fn importance(&self, id: &str) -> Option<f64> {
        let idx = self.index.get(id)?;
        self.importance_table().get(idx.index()).copied()
    }

    fn importance_table(&self) -> &[f64] {
        self.importance.get_or_init(|| {
            let n = self.graph.node_count();
            let edges: Vec<(u32, u32)> = self
                .graph
                .edge_references()
                .map(|e| (e.source().index() as u32, e.target().index() as u32))
                .collect();

            let raw = pagerank(
                &edges,
                n,
                DEFAULT_DAMPING,
                DEFAULT_MAX_ITERATIONS,
                DEFAULT_TOLERANCE,
            )
            .unwrap_or_else(|e| {
                debug!("PageRank failed ({}), using uniform importance", e);
                vec![1.0; n]
            });

            let max = raw.iter().copied().fold(0.0_f64, f64::max);
            if max > 0.0 {
                raw.iter().map(|s| (s / max).clamp(0.0, 1.0)).collect()
            } else {
                vec![0.0; n]
            }
        })
    }

    /// Merge several retrieved subgraphs into one.
    ///
    /// Relationships are deduplicated by (source, target, kind).
    pub fn union(parts: &[Subgraph]) -> Subgraph {
        let mut seen: FxHashSet<(&str, &str, RelationKind)> = FxHashSet::default();
        let assets: Vec<Asset> = parts.iter().flat_map(|p| p.assets().cloned()).collect();
        let relationships: Vec<Relationship> = parts
            .iter()
            .flat_map(|p| p.relationships())
            .filter(|r| seen.insert((r.source.as_str(), r.target.as_str(), r.kind)))
            .cloned()
            .collect();
        Subgraph::from_parts(assets, relationships)
    }

    /// Copy of this subgraph with the given nodes and edges removed.
    ///
    /// Removing a node removes its edges. An edge is named by its
    /// (source, target) pair and removing it removes all parallel edges.
    pub fn without(
        &self,
        nodes: &FxHashSet<AssetId>,
        edges: &FxHashSet<(AssetId, AssetId)>,
    ) -> Subgraph {
        let assets: Vec<Asset> = self
            .graph
            .node_weights()
            .filter(|a| !nodes.contains(&a.id))
            .cloned()
            .collect();
        let relationships: Vec<Relationship> = self
            .graph
            .edge_weights()
            .filter(|r| !edges.contains(&(r.source.clone(), r.target.clone())))
            .cloned()
            .collect();
        Subgraph::from_parts(assets, relationships)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetKind, RelationKind};

    fn chain() -> Subgraph {
        Subgraph::from_parts(
            vec![
                Asset::new("e", AssetKind::Compute).public(),
                Asset::new("m", AssetKind::Compute),
                Asset::new("t", AssetKind::Database).critical(),
            ],
            vec![
                Relationship::new("e", "m", RelationKind::ConnectsTo),
                Relationship::new("m", "t", RelationKind::ConnectsTo),
                Relationship::new("m", "t", RelationKind::Allows),
                Relationship::new("m", "ghost", RelationKind::ConnectsTo),
            ],
        )
    }

    #[test]
    fn test_dangling_edges_dropped() {
        let g = chain();
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 3);
        assert!(!g.contains("ghost"));
    }

    #[test]
    fn test_successors_deduplicated() {
        let g = chain();
        assert_eq!(g.successors("m"), vec!["t"]);
        assert_eq!(g.edges_between("m", "t").len(), 2);
        assert!(g.successors("nope").is_empty());
    }

    #[test]
    fn test_importance_normalized() {
        let g = chain();
        let t = g.importance("t").unwrap();
        let e = g.importance("e").unwrap();
        assert!((t - 1.0).abs() < 1e-9);
        assert!(e < t);
        assert!(g.importance("ghost").is_none());
    }

    #[test]
    fn test_without_removes_parallel_edges() {
        let g = chain();
        let mut edges = FxHashSet::default();
        edges.insert(("m".to_string(), "t".to_string()));
        let pruned = g.without(&FxHashSet::default(), &edges);
        assert_eq!(pruned.edge_count(), 1);

        let path = AttackPath::new(vec!["e".into(), "m".into(), "t".into()]);
        assert!(g.is_traversable(&path));
        assert!(!pruned.is_traversable(&path));
    }

    #[test]
    fn test_union_dedupes_relationships() {
        let a = chain();
        let b = Subgraph::from_parts(
            vec![Asset::new("m", AssetKind::Compute), Asset::new("x", AssetKind::Storage)],
            vec![
                Relationship::new("m", "x", RelationKind::ConnectsTo),
                Relationship::new("m", "m", RelationKind::Other),
            ],
        );
        let merged = Subgraph::union(&[a.clone(), a, b]);
        assert_eq!(merged.node_count(), 4);
        // e->m, m->t (x2 kinds), m->x, m->m
        assert_eq!(merged.edge_count(), 5);
        assert_eq!(merged.successors("m"), vec!["m", "t", "x"]);
    }
}
