//! Read interface to the graph backend

use super::Subgraph;
use crate::errors::PathResult;
use crate::models::{Asset, AssetId};

/// Narrow read access to the asset-relationship graph.
///
/// Every failure is reported as [`crate::errors::PathError::Retrieval`].
/// Implementations are shared across concurrent workflows, hence
/// `Send + Sync`.
pub trait GraphAccessor: Send + Sync {
    /// Ids of the assets an attacker can start from
    fn get_entry_points(&self) -> PathResult<Vec<AssetId>>;

    /// Assets flagged critical, sorted by id
    fn get_crown_jewels(&self) -> PathResult<Vec<Asset>>;

    /// Every asset that can reach `target` within `max_hops`, plus the
    /// relationships among them
    fn get_subgraph(&self, target: &str, max_hops: usize) -> PathResult<Subgraph>;

    fn get_asset(&self, id: &str) -> PathResult<Option<Asset>>;

    /// Changes whenever graph content changes; part of cache keys
    fn graph_version(&self) -> String;
}
