//! End-to-end tests against the sample infrastructure graph
//!
//! The fixture has two public entry points (`web-lb-01`, `vpn-gw-01`) that
//! both reach the crown jewels through `app-server-01`, a 2-hop and a
//! 3-hop route to the database that share their first hop, and one
//! asset nothing can reach.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pathwarden::config::EngineConfig;
use pathwarden::deadline::Deadline;
use pathwarden::errors::{PathError, PathResult};
use pathwarden::graph::{GraphAccessor, InMemoryGraphStore, Subgraph};
use pathwarden::models::{Algorithm, AttackPath, Intent, NoticeKind};
use pathwarden::paths::PathEnumerator;
use pathwarden::scoring::{EdgeLikelihoodModel, ScorerEnsemble};
use pathwarden::workflow::{ExplanationSource, QueryContext, Stage};
use pathwarden::{AnalyzeRequest, AttackPathService, RemediateRequest};

const DB: &str = "crown-jewel-db-001";

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/sample_graph.json")
}

fn store() -> InMemoryGraphStore {
    InMemoryGraphStore::load(&fixture_path()).unwrap()
}

fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.timeouts.deadline_ms = 30_000;
    config.workers.count = 2;
    config
}

fn service_with(config: EngineConfig) -> AttackPathService {
    AttackPathService::new(Arc::new(store()), config)
}

fn service() -> AttackPathService {
    service_with(test_config())
}

fn analyze_db(algorithm: &str, k: usize) -> AnalyzeRequest {
    AnalyzeRequest {
        target: Some(DB.to_string()),
        algorithm: Some(algorithm.to_string()),
        max_hops: Some(4),
        k: Some(k),
    }
}

fn node_lists(paths: &[AttackPath]) -> Vec<Vec<String>> {
    paths.iter().map(|p| p.nodes.clone()).collect()
}

// ============================================================================
// Path properties
// ============================================================================

#[test]
fn test_paths_are_simple_bounded_and_scored_in_range() {
    let svc = service();
    for max_hops in 1..=5 {
        let response = svc
            .analyze(&AnalyzeRequest {
                max_hops: Some(max_hops),
                k: Some(50),
                ..Default::default()
            })
            .unwrap();
        let entries: HashSet<&str> = ["web-lb-01", "vpn-gw-01"].into_iter().collect();

        for path in &response.paths {
            let unique: HashSet<&String> = path.nodes.iter().collect();
            assert_eq!(unique.len(), path.nodes.len(), "repeated node in {}", path.display());
            assert!(path.hops <= max_hops);
            assert_eq!(path.hops, path.nodes.len() - 1);
            assert!(entries.contains(path.entry().unwrap()));
            assert!(response.targets.iter().any(|t| Some(t.as_str()) == path.target()));

            assert!((0.0..=1.0).contains(&path.hybrid_score));
            for score in path.scores.values() {
                assert!((0.0..=1.0).contains(score));
            }
        }
    }
}

#[test]
fn test_hybrid_weights_sum_to_one_with_and_without_learned() {
    let graph = store();
    let subgraph = Arc::new(graph.get_subgraph(DB, 4).unwrap());
    let candidates = PathEnumerator::new(4, 500).enumerate(
        &subgraph,
        &graph.get_entry_points().unwrap(),
        DB,
    );
    let deadline = Deadline::new(Duration::from_secs(30));

    let plain = ScorerEnsemble::builder().workers(2).build();
    let with_learned = ScorerEnsemble::builder()
        .workers(2)
        .learned_model(Arc::new(pathwarden::scoring::LinearEdgeModel::default()))
        .build();

    for ensemble in [plain, with_learned] {
        let outcome = ensemble.score(candidates.clone(), &subgraph, Algorithm::Hybrid, &deadline);
        let total: f64 = outcome.weights.values().sum();
        assert!((total - 1.0).abs() < 1e-9, "weights sum to {total}");
        assert!(outcome.unavailable.is_empty());
    }
}

#[test]
fn test_ranking_is_reproducible_across_services() {
    let first = service().analyze(&analyze_db("hybrid", 10)).unwrap();
    let second = service().analyze(&analyze_db("hybrid", 10)).unwrap();
    assert_eq!(node_lists(&first.paths), node_lists(&second.paths));

    // Best first, ties broken by fewer hops
    for pair in first.paths.windows(2) {
        assert!(pair[0].hybrid_score >= pair[1].hybrid_score);
        if pair[0].hybrid_score == pair[1].hybrid_score {
            assert!(pair[0].hops <= pair[1].hops);
        }
    }
}

#[test]
fn test_analyze_is_idempotent_and_cached() {
    let svc = service();
    let request = AnalyzeRequest {
        target: Some(DB.to_string()),
        algorithm: Some("hybrid".to_string()),
        max_hops: Some(4),
        k: Some(5),
    };
    let first = svc.analyze(&request).unwrap();
    let second = svc.analyze(&request).unwrap();

    assert_eq!(first.paths, second.paths);
    assert_eq!(first.paths.len(), 5);
    assert_ne!(first.request_id, second.request_id);
    assert!(svc.cache_stats().hits >= 1);
}

#[test]
fn test_two_hop_beats_three_hop_under_weighted_cost() {
    let response = service().analyze(&analyze_db("weighted-cost", 10)).unwrap();
    assert_eq!(response.algorithm, Algorithm::WeightedCost);

    let position = |nodes: &[&str]| {
        response
            .paths
            .iter()
            .position(|p| p.nodes == nodes)
            .unwrap_or_else(|| panic!("missing path {nodes:?}"))
    };
    let short = position(&["web-lb-01", "app-server-01", DB]);
    let long = position(&["web-lb-01", "app-server-01", "cache-01", DB]);
    assert!(short < long);
    assert!(response.paths[short].hybrid_score > response.paths[long].hybrid_score);
}

#[test]
fn test_unreachable_target_yields_empty_list() {
    let response = service()
        .analyze(&AnalyzeRequest {
            target: Some("isolated-host".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert!(response.paths.is_empty());
    assert!(response.notices.is_empty());
}

#[test]
fn test_unknown_target_is_invalid_request() {
    let err = service()
        .analyze(&AnalyzeRequest {
            target: Some("mainframe-9000".to_string()),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, PathError::InvalidRequest(_)));
}

// ============================================================================
// Learned scorer degradation
// ============================================================================

struct BrokenModel;

impl EdgeLikelihoodModel for BrokenModel {
    fn name(&self) -> &str {
        "broken"
    }

    fn score(&self, _path: &AttackPath, _subgraph: &Subgraph) -> PathResult<f64> {
        Err(PathError::ScorerUnavailable {
            scorer: "learned".to_string(),
            reason: "model weights not loaded".to_string(),
        })
    }
}

#[test]
fn test_failing_learned_model_renormalizes_remaining_weights() {
    let graph = store();
    let subgraph = Arc::new(graph.get_subgraph(DB, 4).unwrap());
    let candidates =
        PathEnumerator::new(4, 500).enumerate(&subgraph, &graph.get_entry_points().unwrap(), DB);
    let ensemble = ScorerEnsemble::builder()
        .workers(2)
        .learned_model(Arc::new(BrokenModel))
        .build();

    let outcome = ensemble.score(
        candidates,
        &subgraph,
        Algorithm::Hybrid,
        &Deadline::new(Duration::from_secs(30)),
    );
    assert_eq!(outcome.unavailable, vec!["learned".to_string()]);
    assert!(!outcome.weights.contains_key("learned"));
    let total: f64 = outcome.weights.values().sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(outcome
        .notices
        .iter()
        .any(|n| n.kind == NoticeKind::ScorerUnavailable));
    assert!(outcome.paths.iter().all(|p| !p.scores.contains_key("learned")));
}

#[test]
fn test_learned_request_without_model_uses_hybrid() {
    let response = service().analyze(&analyze_db("gnn", 5)).unwrap();
    assert_eq!(response.algorithm, Algorithm::Hybrid);
    assert!(response
        .notices
        .iter()
        .any(|n| n.kind == NoticeKind::ScorerUnavailable));
    assert!(!response.paths.is_empty());
}

#[test]
fn test_configured_learned_model_is_used() {
    let mut config = test_config();
    config.scoring.learned.enabled = true;
    let response = service_with(config).analyze(&analyze_db("learned", 5)).unwrap();
    assert_eq!(response.algorithm, Algorithm::Learned);
    assert!(response.notices.is_empty());
    assert!(response.paths.iter().all(|p| p.scores.contains_key("learned")));
}

// ============================================================================
// Workflow
// ============================================================================

#[test]
fn test_riskiest_path_query_without_advisor() {
    let response = service()
        .query("Where's my riskiest path to the database?", &QueryContext::default())
        .unwrap();

    let plan = response.plan.as_ref().unwrap();
    assert_eq!(plan.intent, Intent::FindRiskiestPaths);
    assert_eq!(plan.targets, vec![DB.to_string()]);
    assert_eq!(response.stage, Stage::Done);

    assert!(!response.paths.is_empty());
    assert!(response.paths.iter().all(|p| p.target() == Some(DB)));
    assert_eq!(response.explanations.len(), response.paths.len());
    assert!(response
        .explanations
        .iter()
        .all(|e| e.source == ExplanationSource::Template));
    assert!(response.remediation.is_none());
    assert_eq!(response.crown_jewels.len(), 2);
}

#[test]
fn test_remediation_query_simulates_and_verifies() {
    let response = service()
        .query("How do I reduce risk to the customer database?", &QueryContext::default())
        .unwrap();
    let plan = response.plan.as_ref().unwrap();
    assert_eq!(plan.intent, Intent::RemediateRisks);
    assert_eq!(response.stage, Stage::Done);

    let remediation = response.remediation.unwrap();
    assert!(!remediation.actions.is_empty());
    assert!(!remediation.simulation_unavailable);
    assert!(remediation.simulated_risk.unwrap() <= remediation.original_risk.unwrap());
}

#[test]
fn test_shared_choke_point_gives_positive_risk_reduction() {
    let response = service()
        .remediate(&RemediateRequest {
            simulate: true,
            ..Default::default()
        })
        .unwrap();

    assert_eq!(response.paths.len(), 5);
    assert!(response.paths.iter().all(|p| p.contains_node("app-server-01")));

    let summary = &response.remediation;
    let choke = summary
        .choke_points
        .iter()
        .find(|c| c.id == "app-server-01")
        .unwrap();
    assert_eq!(choke.path_count, response.paths.len());

    assert!(!summary.remediation_infeasible);
    assert!(summary.risk_reduction.unwrap() > 0.0);
    assert!(summary
        .affected_assets
        .iter()
        .any(|a| a == "web-lb-01" || a == "vpn-gw-01"));
}

#[test]
fn test_remediate_without_simulation() {
    let response = service()
        .remediate(&RemediateRequest {
            simulate: false,
            max_actions: Some(1),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(response.remediation.actions.len(), 1);
    assert!(response.remediation.risk_reduction.is_none());
    assert!(!response.remediation.simulation_unavailable);
}
