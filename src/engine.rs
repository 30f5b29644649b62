//! Retrieval, enumeration, scoring and ranking behind one handle
//!
//! The engine is shared by every workflow and every service call. Graph
//! calls run under the per-call timeout with a single retry on transient
//! failures; scored candidate sets go through the [`ResultCache`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::cache::{fingerprint, CacheStats, Cacheable, ResultCache};
use crate::deadline::{call_with_timeout, Deadline};
use crate::errors::{PathError, PathResult};
use crate::graph::{GraphAccessor, Subgraph};
use crate::models::{Algorithm, Asset, AssetId, AttackPath, Notice, NoticeKind};
use crate::paths::{PathEnumerator, Ranker};
use crate::scoring::ScorerEnsemble;

/// Every scored candidate for one (targets, algorithm, max hops) key,
/// best first
#[derive(Debug, Clone, Default)]
pub struct RankedPaths {
    pub paths: Vec<AttackPath>,
    pub algorithm: Algorithm,
    pub weights: BTreeMap<String, f64>,
    /// Scorers dropped while computing this set
    pub unavailable: Vec<String>,
    pub notices: Vec<Notice>,
}

impl RankedPaths {
    /// The best `k` paths
    pub fn top(&self, k: usize) -> Vec<AttackPath> {
        self.paths.iter().take(k).cloned().collect()
    }
}

impl Cacheable for RankedPaths {
    /// Degraded sets are recomputed on the next request
    fn is_cacheable(&self) -> bool {
        self.unavailable.is_empty()
    }
}

pub struct PathEngine {
    graph: Arc<dyn GraphAccessor>,
    ensemble: ScorerEnsemble,
    cache: ResultCache<RankedPaths>,
    candidate_cap: usize,
    call_timeout: Duration,
}

impl PathEngine {
    pub fn new(
        graph: Arc<dyn GraphAccessor>,
        ensemble: ScorerEnsemble,
        cache: ResultCache<RankedPaths>,
        candidate_cap: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            graph,
            ensemble,
            cache,
            candidate_cap,
            call_timeout,
        }
    }

    pub fn graph(&self) -> &Arc<dyn GraphAccessor> {
        &self.graph
    }

    pub fn ensemble(&self) -> &ScorerEnsemble {
        &self.ensemble
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Run one graph call on a helper thread, retrying once if it fails transiently
    fn call_graph<T, F>(&self, what: &str, notices: &mut Vec<Notice>, f: F) -> PathResult<T>
    where
        T: Send + 'static,
        F: Fn(&dyn GraphAccessor) -> PathResult<T> + Clone + Send + 'static,
    {
        let attempt = || {
            let graph = Arc::clone(&self.graph);
            let f = f.clone();
            call_with_timeout("graph", self.call_timeout, move || f(graph.as_ref()))
                .map_err(|e| PathError::Retrieval(format!("{what}: {e}")))
                .and_then(|result| result)
        };

        match attempt() {
            Err(e) if e.is_transient() => {
                warn!("Retrying {} after transient failure: {}", what, e);
                notices.push(Notice::new(
                    NoticeKind::RetrievalRetried,
                    format!("{what} retried after: {e}"),
                ));
                attempt().inspect_err(|e| error!("{} failed after retry: {}", what, e))
            }
            Err(e) => {
                error!("{} failed: {}", what, e);
                Err(e)
            }
            ok => ok,
        }
    }

    pub fn crown_jewels(&self, notices: &mut Vec<Notice>) -> PathResult<Vec<Asset>> {
        self.call_graph("crown jewel lookup", notices, |g| g.get_crown_jewels())
    }

    pub fn entry_points(&self, notices: &mut Vec<Notice>) -> PathResult<Vec<AssetId>> {
        self.call_graph("entry point lookup", notices, |g| g.get_entry_points())
    }

    pub fn asset(&self, id: &str, notices: &mut Vec<Notice>) -> PathResult<Option<Asset>> {
        let id = id.to_string();
        self.call_graph("asset lookup", notices, move |g| g.get_asset(&id))
    }

    /// Union of the bounded subgraphs around every target
    pub fn retrieve(
        &self,
        targets: &[AssetId],
        max_hops: usize,
        notices: &mut Vec<Notice>,
    ) -> PathResult<Arc<Subgraph>> {
        let start = Instant::now();
        let mut parts = Vec::with_capacity(targets.len());
        for target in targets {
            let owned = target.clone();
            let part = self.call_graph("subgraph retrieval", notices, move |g| {
                g.get_subgraph(&owned, max_hops)
            })?;
            parts.push(part);
        }

        let subgraph = match parts.len() {
            1 => parts.pop().unwrap_or_default(),
            _ => Subgraph::union(&parts),
        };
        info!(
            "Retrieved {} assets, {} relationships for {} targets in {:?}",
            subgraph.node_count(),
            subgraph.edge_count(),
            targets.len(),
            start.elapsed()
        );
        Ok(Arc::new(subgraph))
    }

    /// Scorer names a request for `algorithm` amounts to, for cache keys
    fn algorithm_set(&self, algorithm: Algorithm) -> Vec<&'static str> {
        let hybrid = || {
            let mut set = vec![
                Algorithm::WeightedCost.as_str(),
                Algorithm::Centrality.as_str(),
                Algorithm::Motif.as_str(),
            ];
            if self.ensemble.has_learned() {
                set.push(Algorithm::Learned.as_str());
            }
            set
        };
        match algorithm {
            Algorithm::Hybrid => hybrid(),
            single => vec![single.as_str()],
        }
    }

    /// Enumerate, score and rank candidates toward `targets`.
    pub fn score_and_rank(
        &self,
        subgraph: &Arc<Subgraph>,
        entry_points: &[AssetId],
        targets: &[AssetId],
        algorithm: Algorithm,
        max_hops: usize,
        deadline: &Deadline,
        notices: &mut Vec<Notice>,
    ) -> PathResult<Arc<RankedPaths>> {
        // Degrade before the cache lookup so the notice is never cached
        let algorithm = if algorithm == Algorithm::Learned && !self.ensemble.has_learned() {
            let msg = "no learned model configured, using hybrid scoring";
            warn!("{}", msg);
            notices.push(Notice::new(NoticeKind::ScorerUnavailable, msg));
            Algorithm::Hybrid
        } else {
            algorithm
        };

        let key = fingerprint(
            targets,
            &self.algorithm_set(algorithm),
            max_hops,
            &self.graph.graph_version(),
        );

        let ranked = self.cache.get_or_compute(&key, || {
            let start = Instant::now();
            let candidates = PathEnumerator::new(max_hops, self.candidate_cap)
                .enumerate_targets(subgraph, entry_points, targets);
            let count = candidates.len();

            let outcome = self.ensemble.score(candidates, subgraph, algorithm, deadline);
            let mut paths = outcome.paths;
            paths.sort_by(Ranker::compare);

            debug!(
                "Scored {} candidates with {} in {:?}",
                count,
                outcome.algorithm,
                start.elapsed()
            );
            Ok::<_, PathError>(RankedPaths {
                paths,
                algorithm: outcome.algorithm,
                weights: outcome.weights,
                unavailable: outcome.unavailable,
                notices: outcome.notices,
            })
        })?;
        notices.extend(ranked.notices.iter().cloned());
        Ok(ranked)
    }

    /// Re-score `paths` against a pruned subgraph with the weights they
    /// were ranked under, keeping their order
    pub fn rescore(
        &self,
        paths: Vec<AttackPath>,
        subgraph: Arc<Subgraph>,
        weights: &BTreeMap<String, f64>,
        notices: &mut Vec<Notice>,
    ) -> Vec<AttackPath> {
        self.ensemble.rescore(paths, &subgraph, weights, notices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InMemoryGraphStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const GRAPH: &str = r#"{
        "assets": [
            {"id": "e", "type": "compute", "public": true},
            {"id": "m", "type": "compute"},
            {"id": "t", "type": "database", "critical": true},
            {"id": "b", "type": "storage", "critical": true}
        ],
        "relationships": [
            {"source": "e", "target": "m", "type": "connects-to"},
            {"source": "m", "target": "t", "type": "connects-to"},
            {"source": "m", "target": "b", "type": "connects-to"}
        ]
    }"#;

    fn engine_for(graph: Arc<dyn GraphAccessor>) -> PathEngine {
        PathEngine::new(
            graph,
            ScorerEnsemble::builder().workers(2).build(),
            ResultCache::default(),
            500,
            Duration::from_millis(200),
        )
    }

    /// Fails the first `failures` subgraph calls with a transient error
    struct Flaky {
        inner: InMemoryGraphStore,
        failures: usize,
        calls: AtomicUsize,
    }

    impl GraphAccessor for Flaky {
        fn get_entry_points(&self) -> PathResult<Vec<AssetId>> {
            self.inner.get_entry_points()
        }
        fn get_crown_jewels(&self) -> PathResult<Vec<Asset>> {
            self.inner.get_crown_jewels()
        }
        fn get_subgraph(&self, target: &str, max_hops: usize) -> PathResult<Subgraph> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(PathError::Retrieval("backend unreachable".into()));
            }
            self.inner.get_subgraph(target, max_hops)
        }
        fn get_asset(&self, id: &str) -> PathResult<Option<Asset>> {
            self.inner.get_asset(id)
        }
        fn graph_version(&self) -> String {
            self.inner.graph_version()
        }
    }

    #[test]
    fn test_union_of_targets() {
        let engine = engine_for(Arc::new(InMemoryGraphStore::from_json(GRAPH).unwrap()));
        let mut notices = Vec::new();
        let targets = vec!["t".to_string(), "b".to_string()];
        let sub = engine.retrieve(&targets, 4, &mut notices).unwrap();
        assert_eq!(sub.node_count(), 4);

        let ranked = engine
            .score_and_rank(
                &sub,
                &["e".to_string()],
                &targets,
                Algorithm::Hybrid,
                4,
                &Deadline::new(Duration::from_secs(60)),
                &mut notices,
            )
            .unwrap();
        assert_eq!(ranked.paths.len(), 2);
        assert_eq!(ranked.top(1).len(), 1);
        assert!(notices.is_empty());
    }

    #[test]
    fn test_transient_failure_retried_once() {
        let flaky = Flaky {
            inner: InMemoryGraphStore::from_json(GRAPH).unwrap(),
            failures: 1,
            calls: AtomicUsize::new(0),
        };
        let engine = engine_for(Arc::new(flaky));
        let mut notices = Vec::new();
        assert!(engine.retrieve(&["t".to_string()], 4, &mut notices).is_ok());
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::RetrievalRetried);
    }

    #[test]
    fn test_persistent_failure_is_fatal() {
        let flaky = Flaky {
            inner: InMemoryGraphStore::from_json(GRAPH).unwrap(),
            failures: 2,
            calls: AtomicUsize::new(0),
        };
        let engine = engine_for(Arc::new(flaky));
        let mut notices = Vec::new();
        let err = engine.retrieve(&["t".to_string()], 4, &mut notices).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_target_not_retried() {
        let engine = engine_for(Arc::new(InMemoryGraphStore::from_json(GRAPH).unwrap()));
        let mut notices = Vec::new();
        assert!(engine.retrieve(&["nope".to_string()], 4, &mut notices).is_err());
        assert!(notices.is_empty());
    }

    #[test]
    fn test_second_request_served_from_cache() {
        let engine = engine_for(Arc::new(InMemoryGraphStore::from_json(GRAPH).unwrap()));
        let mut notices = Vec::new();
        let targets = vec!["t".to_string()];
        let sub = engine.retrieve(&targets, 4, &mut notices).unwrap();
        let deadline = Deadline::new(Duration::from_secs(60));
        let entries = vec!["e".to_string()];
        let first = engine
            .score_and_rank(&sub, &entries, &targets, Algorithm::Hybrid, 4, &deadline, &mut notices)
            .unwrap();
        let second = engine
            .score_and_rank(&sub, &entries, &targets, Algorithm::Hybrid, 4, &deadline, &mut notices)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.cache_stats().hits, 1);

        // A learned request without a model shares the hybrid entry but still says so
        let third = engine
            .score_and_rank(&sub, &entries, &targets, Algorithm::Learned, 4, &deadline, &mut notices)
            .unwrap();
        assert!(Arc::ptr_eq(&first, &third));
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::ScorerUnavailable);
    }
}
