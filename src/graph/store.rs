//! In-memory graph store loaded from a JSON snapshot
//!
//! Snapshot format:
//!
//! ```json
//! {
//!   "assets": [{"id": "vm-web-01", "type": "compute", "public": true}],
//!   "relationships": [{"source": "vm-web-01", "target": "db-01", "type": "connects-to"}],
//!   "entry_points": ["vm-web-01"]
//! }
//! ```
//!
//! `entry_points` is optional; without it every public asset is an entry
//! point. The graph version is a SHA-256 over the serialized snapshot, so
//! two stores loaded from identical content share cache entries.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, info};

use super::{GraphAccessor, Subgraph};
use crate::errors::{PathError, PathResult};
use crate::models::{Asset, AssetId, Relationship};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_points: Option<Vec<AssetId>>,
}

pub struct InMemoryGraphStore {
    graph: Subgraph,
    entry_points: Vec<AssetId>,
    version: String,
}

impl InMemoryGraphStore {
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let version = snapshot_version(&snapshot);

        let mut entry_points: Vec<AssetId> = match &snapshot.entry_points {
            Some(explicit) => explicit.clone(),
            None => snapshot
                .assets
                .iter()
                .filter(|a| a.public)
                .map(|a| a.id.clone())
                .collect(),
        };
        entry_points.sort();
        entry_points.dedup();

        let graph = Subgraph::from_parts(snapshot.assets, snapshot.relationships);
        entry_points.retain(|id| graph.contains(id));

        info!(
            "Loaded graph: {} assets, {} relationships, {} entry points",
            graph.node_count(),
            graph.edge_count(),
            entry_points.len()
        );

        Self {
            graph,
            entry_points,
            version,
        }
    }

    pub fn from_json(json: &str) -> PathResult<Self> {
        let snapshot: GraphSnapshot = serde_json::from_str(json)
            .map_err(|e| PathError::Retrieval(format!("malformed graph snapshot: {e}")))?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn load(path: &Path) -> PathResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            PathError::Retrieval(format!("cannot read graph snapshot {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

fn snapshot_version(snapshot: &GraphSnapshot) -> String {
    let bytes = serde_json::to_vec(snapshot).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    digest.iter().take(8).map(|b| format!("{b:02x}")).collect()
}

impl GraphAccessor for InMemoryGraphStore {
    fn get_entry_points(&self) -> PathResult<Vec<AssetId>> {
        Ok(self.entry_points.clone())
    }

    fn get_crown_jewels(&self) -> PathResult<Vec<Asset>> {
        let mut jewels: Vec<Asset> = self.graph.assets().filter(|a| a.critical).cloned().collect();
        jewels.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(jewels)
    }

    fn get_subgraph(&self, target: &str, max_hops: usize) -> PathResult<Subgraph> {
        if !self.graph.contains(target) {
            return Err(PathError::Retrieval(format!("unknown target asset '{target}'")));
        }

        // Reverse BFS: everything that can reach the target within max_hops
        let mut keep: rustc_hash::FxHashSet<&str> = rustc_hash::FxHashSet::default();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
        keep.insert(target);
        queue.push_back((target, 0));
        while let Some((id, depth)) = queue.pop_front() {
            if depth == max_hops {
                continue;
            }
            for pred in self.graph.predecessors(id) {
                if keep.insert(pred) {
                    queue.push_back((pred, depth + 1));
                }
            }
        }

        let assets: Vec<Asset> = self
            .graph
            .assets()
            .filter(|a| keep.contains(a.id.as_str()))
            .cloned()
            .collect();
        let relationships: Vec<Relationship> = self
            .graph
            .relationships()
            .filter(|r| keep.contains(r.source.as_str()) && keep.contains(r.target.as_str()))
            .cloned()
            .collect();

        debug!(
            "Subgraph for '{}' within {} hops: {} assets, {} relationships",
            target,
            max_hops,
            assets.len(),
            relationships.len()
        );
        Ok(Subgraph::from_parts(assets, relationships))
    }

    fn get_asset(&self, id: &str) -> PathResult<Option<Asset>> {
        Ok(self.graph.asset(id).cloned())
    }

    fn graph_version(&self) -> String {
        self.version.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPH: &str = r#"{
        "assets": [
            {"id": "e", "type": "compute", "public": true},
            {"id": "m", "type": "compute"},
            {"id": "n", "type": "subnet"},
            {"id": "t", "type": "database", "critical": true, "name": "crown-jewel-db-001"},
            {"id": "far", "type": "compute", "public": true}
        ],
        "relationships": [
            {"source": "e", "target": "m", "type": "connects-to"},
            {"source": "m", "target": "t", "type": "connects-to"},
            {"source": "far", "target": "e", "type": "connects-to"},
            {"source": "t", "target": "n", "type": "connects-to"}
        ]
    }"#;

    #[test]
    fn test_public_assets_are_default_entry_points() {
        let store = InMemoryGraphStore::from_json(GRAPH).unwrap();
        assert_eq!(store.get_entry_points().unwrap(), vec!["e", "far"]);
    }

    #[test]
    fn test_subgraph_bounded_by_hops() {
        let store = InMemoryGraphStore::from_json(GRAPH).unwrap();
        let sub = store.get_subgraph("t", 2).unwrap();
        assert!(sub.contains("e"));
        assert!(sub.contains("m"));
        assert!(!sub.contains("far"));
        // Downstream of the target is irrelevant
        assert!(!sub.contains("n"));

        let wider = store.get_subgraph("t", 3).unwrap();
        assert!(wider.contains("far"));
    }

    #[test]
    fn test_unknown_target_is_retrieval_error() {
        let store = InMemoryGraphStore::from_json(GRAPH).unwrap();
        assert!(matches!(
            store.get_subgraph("nope", 3),
            Err(PathError::Retrieval(_))
        ));
    }

    #[test]
    fn test_version_tracks_content() {
        let a = InMemoryGraphStore::from_json(GRAPH).unwrap();
        let b = InMemoryGraphStore::from_json(GRAPH).unwrap();
        let c = InMemoryGraphStore::from_json(r#"{"assets": [{"id": "x"}]}"#).unwrap();
        assert_eq!(a.graph_version(), b.graph_version());
        assert_ne!(a.graph_version(), c.graph_version());
    }

    #[test]
    fn test_crown_jewels() {
        let store = InMemoryGraphStore::from_json(GRAPH).unwrap();
        let jewels = store.get_crown_jewels().unwrap();
        assert_eq!(jewels.len(), 1);
        assert_eq!(jewels[0].name, "crown-jewel-db-001");
    }
}
