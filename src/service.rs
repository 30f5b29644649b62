//! Request/response surface: `analyze`, `query`, `remediate`
//!
//! Every response is serde-serializable and carries a request id, a
//! timestamp and the wall-clock latency of the call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::advisors::{ExplainerAdvisor, PlannerAdvisor};
use crate::cache::{CacheStats, ResultCache};
use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::engine::PathEngine;
use crate::errors::{PathError, PathResult};
use crate::graph::GraphAccessor;
use crate::models::{Algorithm, Asset, AssetId, AttackPath, Intent, Notice};
use crate::remediation::{
    BlastRadius, ChokePoint, RemediationAction, RemediationPlan, SimulationResult,
};
use crate::scoring::{LinearEdgeModel, ScorerEnsemble};
use crate::workflow::planner::MAX_HOPS_LIMIT;
use crate::workflow::{
    resolve_crown_jewel, Explanation, PlanSource, QueryContext, QueryPlan, Stage,
    WorkflowOrchestrator, WorkflowSettings,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzeRequest {
    /// Asset id or crown-jewel name; all crown jewels when absent
    pub target: Option<String>,
    /// Algorithm name or alias; hybrid when absent
    pub algorithm: Option<String>,
    pub max_hops: Option<usize>,
    pub k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub request_id: String,
    pub generated_at: DateTime<Utc>,
    pub targets: Vec<AssetId>,
    /// Algorithm actually used
    pub algorithm: Algorithm,
    pub max_hops: usize,
    pub paths: Vec<AttackPath>,
    /// Scorers dropped for this request
    pub degraded: Vec<String>,
    pub notices: Vec<Notice>,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub request_id: String,
    pub generated_at: DateTime<Utc>,
    pub plan: Option<QueryPlan>,
    pub stage: Stage,
    pub paths: Vec<AttackPath>,
    pub explanations: Vec<Explanation>,
    pub crown_jewels: Vec<Asset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationSummary>,
    pub notices: Vec<Notice>,
    pub latency_ms: u64,
}

/// Remediation outcome shared by `query` and `remediate`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemediationSummary {
    pub actions: Vec<RemediationAction>,
    pub choke_points: Vec<ChokePoint>,
    pub estimated_timeline: String,
    pub remediation_infeasible: bool,
    /// `None` when no simulation ran or it was discarded
    pub risk_reduction: Option<f64>,
    pub original_risk: Option<f64>,
    pub simulated_risk: Option<f64>,
    pub affected_assets: Vec<AssetId>,
    pub recommendations: Vec<String>,
    pub simulation_unavailable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediateRequest {
    pub actions_hint: Vec<String>,
    pub simulate: bool,
    pub max_actions: Option<usize>,
    pub max_effort: Option<f64>,
    pub blast_radius: Option<BlastRadius>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediateResponse {
    pub request_id: String,
    pub generated_at: DateTime<Utc>,
    /// The ranked paths remediation was planned for
    pub paths: Vec<AttackPath>,
    #[serde(flatten)]
    pub remediation: RemediationSummary,
    pub notices: Vec<Notice>,
    pub latency_ms: u64,
}

pub struct AttackPathService {
    engine: Arc<PathEngine>,
    orchestrator: WorkflowOrchestrator,
    config: EngineConfig,
}

impl AttackPathService {
    /// Build the engine, cache and workflow described by `config` over `graph`.
    /// Advisors are attached separately with [`Self::with_advisors`].
    pub fn new(graph: Arc<dyn GraphAccessor>, config: EngineConfig) -> Self {
        let mut builder = ScorerEnsemble::builder()
            .workers(config.workers.count)
            .candidate_cap(config.search.candidate_cap)
            .weights(config.scoring.weights)
            .motif_penalty(config.scoring.motif_penalty)
            .call_timeout(config.timeouts.call_timeout());
        if config.scoring.learned.enabled {
            let model: LinearEdgeModel = config.scoring.learned.model;
            debug!("Learned scorer enabled with {:?}", model);
            builder = builder.learned_model(Arc::new(model));
        }

        let engine = Arc::new(PathEngine::new(
            graph,
            builder.build(),
            ResultCache::new(config.cache.ttl(), config.cache.max_entries),
            config.search.candidate_cap,
            config.timeouts.call_timeout(),
        ));

        let orchestrator = WorkflowOrchestrator::new(
            Arc::clone(&engine),
            WorkflowSettings {
                default_max_hops: config.search.max_hops,
                top_k: config.search.top_k,
                max_actions: config.remediation.max_actions,
                confidence_threshold: config.advisor.confidence_threshold,
                deadline: config.timeouts.deadline(),
            },
        );

        Self {
            engine,
            orchestrator,
            config,
        }
    }

    pub fn with_advisors(
        mut self,
        planner: Option<Arc<dyn PlannerAdvisor>>,
        explainer: Option<Arc<dyn ExplainerAdvisor>>,
    ) -> Self {
        if let Some(planner) = planner {
            self.orchestrator = self.orchestrator.with_planner_advisor(planner);
        }
        if let Some(explainer) = explainer {
            self.orchestrator = self.orchestrator.with_explainer(explainer);
        }
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.engine.cache_stats()
    }

    pub fn crown_jewels(&self) -> PathResult<Vec<Asset>> {
        self.engine.crown_jewels(&mut Vec::new())
    }

    /// Top-`k` attack paths toward `target` (or every crown jewel).
    pub fn analyze(&self, request: &AnalyzeRequest) -> PathResult<AnalyzeResponse> {
        let start = Instant::now();
        let deadline = Deadline::new(self.config.timeouts.deadline());
        let algorithm = match &request.algorithm {
            Some(name) => name.parse::<Algorithm>().map_err(PathError::InvalidRequest)?,
            None => Algorithm::Hybrid,
        };
        let max_hops = validate_hops(request.max_hops.unwrap_or(self.config.search.max_hops))?;
        let k = validate_k(request.k.unwrap_or(self.config.search.top_k))?;

        let mut notices = Vec::new();
        let targets = self.resolve_targets(request.target.as_deref(), &mut notices)?;

        let subgraph = self.engine.retrieve(&targets, max_hops, &mut notices)?;
        let entry_points = self.engine.entry_points(&mut notices)?;
        let ranked = self.engine.score_and_rank(
            &subgraph,
            &entry_points,
            &targets,
            algorithm,
            max_hops,
            &deadline,
            &mut notices,
        )?;

        let paths = ranked.top(k);
        let latency_ms = start.elapsed().as_millis() as u64;
        info!(
            "analyze: {} paths to {:?} ({}, {} hops) in {}ms",
            paths.len(),
            targets,
            ranked.algorithm,
            max_hops,
            latency_ms
        );

        Ok(AnalyzeResponse {
            request_id: Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            targets,
            algorithm: ranked.algorithm,
            max_hops,
            paths,
            degraded: ranked.unavailable.clone(),
            notices,
            latency_ms,
        })
    }

    /// Free-text query through the full workflow.
    pub fn query(&self, text: &str, context: &QueryContext) -> PathResult<QueryResponse> {
        let start = Instant::now();
        if text.trim().is_empty() {
            return Err(PathError::InvalidRequest("query text is empty".to_string()));
        }
        if let Some(k) = context.k {
            validate_k(k)?;
        }

        let state = self.orchestrator.run(text, context).into_result()?;
        let remediation = state.remediation.as_ref().map(|plan| {
            summarize(plan, state.simulation.as_ref(), state.simulation_unavailable)
        });

        Ok(QueryResponse {
            request_id: state.request_id,
            generated_at: Utc::now(),
            plan: state.plan,
            stage: state.stage,
            paths: state.paths,
            explanations: state.explanations,
            crown_jewels: state.crown_jewels,
            remediation,
            notices: state.notices,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Remediation for the riskiest paths across every crown jewel.
    pub fn remediate(&self, request: &RemediateRequest) -> PathResult<RemediateResponse> {
        let start = Instant::now();
        let crown_jewels = self.crown_jewels()?;

        let plan = QueryPlan {
            intent: if request.simulate {
                Intent::SimulateFix
            } else {
                Intent::RemediateRisks
            },
            targets: crown_jewels.iter().map(|a| a.id.clone()).collect(),
            target_resolved: false,
            algorithm: Algorithm::Hybrid,
            max_hops: self.config.search.max_hops,
            blast_radius: request.blast_radius,
            risk_reduction_target: None,
            source: PlanSource::Rules,
        };
        let context = QueryContext {
            actions_hint: request.actions_hint.clone(),
            simulate: request.simulate,
            max_actions: request.max_actions,
            max_effort: request.max_effort,
            explain: false,
            k: None,
        };

        let state = self.orchestrator.run_plan(plan, &context).into_result()?;
        let remediation = state
            .remediation
            .as_ref()
            .map(|plan| summarize(plan, state.simulation.as_ref(), state.simulation_unavailable))
            .unwrap_or_else(|| RemediationSummary {
                remediation_infeasible: true,
                ..Default::default()
            });

        Ok(RemediateResponse {
            request_id: state.request_id,
            generated_at: Utc::now(),
            paths: state.paths,
            remediation,
            notices: state.notices,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn resolve_targets(&self, target: Option<&str>, notices: &mut Vec<Notice>) -> PathResult<Vec<AssetId>> {
        let crown_jewels = self.engine.crown_jewels(notices)?;
        let Some(target) = target.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(crown_jewels.into_iter().map(|a| a.id).collect());
        };
        if let Some(id) = resolve_crown_jewel(target, &crown_jewels) {
            return Ok(vec![id]);
        }
        // Any asset can be analyzed as a target, not only crown jewels
        match self.engine.asset(target, notices)? {
            Some(asset) => Ok(vec![asset.id]),
            None => Err(PathError::InvalidRequest(format!("unknown target '{target}'"))),
        }
    }
}

fn validate_hops(max_hops: usize) -> PathResult<usize> {
    if max_hops == 0 || max_hops > MAX_HOPS_LIMIT {
        return Err(PathError::InvalidRequest(format!(
            "max_hops must be between 1 and {MAX_HOPS_LIMIT}, got {max_hops}"
        )));
    }
    Ok(max_hops)
}

fn validate_k(k: usize) -> PathResult<usize> {
    if k == 0 {
        return Err(PathError::InvalidRequest("k must be at least 1".to_string()));
    }
    Ok(k)
}

fn summarize(
    plan: &RemediationPlan,
    simulation: Option<&SimulationResult>,
    simulation_unavailable: bool,
) -> RemediationSummary {
    let mut affected: Vec<AssetId> = plan
        .actions
        .iter()
        .flat_map(|a| a.assets.iter().cloned())
        .collect();
    affected.sort();
    affected.dedup();

    RemediationSummary {
        actions: plan.actions.clone(),
        choke_points: plan.choke_points.clone(),
        estimated_timeline: plan.estimated_timeline.clone(),
        remediation_infeasible: plan.infeasible,
        risk_reduction: simulation.map(|s| s.risk_reduction),
        original_risk: simulation.map(|s| s.original_risk),
        simulated_risk: simulation.map(|s| s.simulated_risk),
        affected_assets: simulation.map(|s| s.affected_assets.clone()).unwrap_or(affected),
        recommendations: simulation.map(|s| s.recommendations.clone()).unwrap_or_default(),
        simulation_unavailable,
    }
}
