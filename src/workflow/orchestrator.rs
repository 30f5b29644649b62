//! Workflow orchestration
//!
//! One [`WorkflowState`] per request, driven through the stages of
//! [`Stage`]:
//!
//! ```text
//! plan (rules, advisor override) ─► retrieve ─► score/rank (cache) ─► explain
//!                                                                       │
//!                      remediation intents: propose ─► simulate ─► verify
//! ```
//!
//! Only retrieval failures end a run in `Failed`. Everything else degrades
//! to a best-effort result and records a [`Notice`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::planner::{PlanSource, QueryPlan, RulePlanner, MAX_HOPS_LIMIT};
use super::state::{validate_transition, Stage};
use crate::advisors::{
    templated_explanation, AdvisorPlan, ExplainContext, ExplainerAdvisor, PlannerAdvisor,
};
use crate::config::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_MAX_HOPS};
use crate::deadline::{call_with_timeout, Deadline, DEFAULT_DEADLINE};
use crate::engine::PathEngine;
use crate::errors::{PathError, PathResult};
use crate::graph::Subgraph;
use crate::models::{Algorithm, Asset, AssetId, AttackPath, Intent, Notice, NoticeKind};
use crate::paths::DEFAULT_TOP_K;
use crate::remediation::{simulate, RemediationConstraints, RemediationPlan, RemediationPlanner, SimulationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationSource {
    Advisor,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub path: Vec<AssetId>,
    pub text: String,
    pub source: ExplanationSource,
}

/// Caller options that are not part of the query text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryContext {
    /// Action kinds or asset ids remediation must stick to
    pub actions_hint: Vec<String>,
    /// Simulate proposed remediations (always on for simulate intents)
    pub simulate: bool,
    pub max_actions: Option<usize>,
    pub max_effort: Option<f64>,
    /// Ask the explainer advisor for explanations
    pub explain: bool,
    pub k: Option<usize>,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self {
            actions_hint: Vec::new(),
            simulate: true,
            max_actions: None,
            max_effort: None,
            explain: true,
            k: None,
        }
    }
}

/// Per-request state; discarded once the response is assembled
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    pub request_id: String,
    pub query: String,
    pub intent: Intent,
    pub plan: Option<QueryPlan>,
    pub crown_jewels: Vec<Asset>,
    pub targets: Vec<AssetId>,
    pub algorithm: Algorithm,
    pub max_hops: usize,
    pub subgraph: Option<Arc<Subgraph>>,
    pub paths: Vec<AttackPath>,
    /// Scorers dropped while scoring this request
    pub degraded: Vec<String>,
    pub explanations: Vec<Explanation>,
    pub remediation: Option<RemediationPlan>,
    pub simulation: Option<SimulationResult>,
    pub simulation_unavailable: bool,
    pub stage: Stage,
    pub notices: Vec<Notice>,
    pub errors: Vec<PathError>,
}

impl WorkflowState {
    pub fn new(query: &str) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            query: query.to_string(),
            ..Default::default()
        }
    }

    pub fn advance(&mut self, to: Stage) -> PathResult<()> {
        validate_transition(self.stage, to)?;
        debug!("[{}] {} -> {}", short_id(&self.request_id), self.stage, to);
        self.stage = to;
        Ok(())
    }

    fn notice(&mut self, kind: NoticeKind, message: impl Into<String>) {
        let message = message.into();
        warn!("[{}] {}", short_id(&self.request_id), message);
        self.notices.push(Notice::new(kind, message));
    }

    fn fail(&mut self, err: PathError) {
        error!("[{}] workflow failed in {}: {}", short_id(&self.request_id), self.stage, err);
        self.errors.push(err);
        // Failed is reachable from every non-terminal stage
        if !self.stage.is_terminal() {
            self.stage = Stage::Failed;
        }
    }

    /// The fatal error of a failed run, the state otherwise
    pub fn into_result(self) -> PathResult<Self> {
        if self.stage == Stage::Failed {
            let err = self
                .errors
                .last()
                .cloned()
                .unwrap_or_else(|| PathError::Retrieval("workflow failed".to_string()));
            return Err(err);
        }
        Ok(self)
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[derive(Debug, Clone, Copy)]
pub struct WorkflowSettings {
    pub default_max_hops: usize,
    pub top_k: usize,
    pub max_actions: usize,
    pub confidence_threshold: f64,
    pub deadline: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            default_max_hops: DEFAULT_MAX_HOPS,
            top_k: DEFAULT_TOP_K,
            max_actions: crate::remediation::DEFAULT_MAX_ACTIONS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

pub struct WorkflowOrchestrator {
    engine: Arc<PathEngine>,
    planner: RulePlanner,
    planner_advisor: Option<Arc<dyn PlannerAdvisor>>,
    explainer: Option<Arc<dyn ExplainerAdvisor>>,
    remediator: RemediationPlanner,
    settings: WorkflowSettings,
}

impl WorkflowOrchestrator {
    pub fn new(engine: Arc<PathEngine>, settings: WorkflowSettings) -> Self {
        Self {
            engine,
            planner: RulePlanner::new(settings.default_max_hops),
            planner_advisor: None,
            explainer: None,
            remediator: RemediationPlanner::new(settings.max_actions),
            settings,
        }
    }

    pub fn with_planner_advisor(mut self, advisor: Arc<dyn PlannerAdvisor>) -> Self {
        self.planner_advisor = Some(advisor);
        self
    }

    pub fn with_explainer(mut self, explainer: Arc<dyn ExplainerAdvisor>) -> Self {
        self.explainer = Some(explainer);
        self
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Plan `query` and run the workflow to a terminal stage.
    pub fn run(&self, query: &str, context: &QueryContext) -> WorkflowState {
        let deadline = Deadline::new(self.settings.deadline);
        let mut state = WorkflowState::new(query);
        info!("[{}] query: {}", short_id(&state.request_id), query);

        let crown_jewels = match self.engine.crown_jewels(&mut state.notices) {
            Ok(jewels) => jewels,
            Err(e) => {
                state.fail(e);
                return state;
            }
        };

        let plan = self.plan(&mut state, query, &crown_jewels, &deadline);
        state.crown_jewels = crown_jewels;
        self.drive(state, plan, context, &deadline)
    }

    /// Run the workflow from an already-made plan, skipping query planning.
    pub fn run_plan(&self, plan: QueryPlan, context: &QueryContext) -> WorkflowState {
        let deadline = Deadline::new(self.settings.deadline);
        let mut state = WorkflowState::new("");
        match self.engine.crown_jewels(&mut state.notices) {
            Ok(jewels) => state.crown_jewels = jewels,
            Err(e) => {
                state.fail(e);
                return state;
            }
        }
        self.drive(state, plan, context, &deadline)
    }

    fn drive(
        &self,
        mut state: WorkflowState,
        plan: QueryPlan,
        context: &QueryContext,
        deadline: &Deadline,
    ) -> WorkflowState {
        if let Err(e) = self.execute(&mut state, plan, context, deadline) {
            state.fail(e);
            return state;
        }
        info!(
            "[{}] done in {}ms: {} paths, {} notices",
            short_id(&state.request_id),
            deadline.elapsed_ms(),
            state.paths.len(),
            state.notices.len()
        );
        state
    }

    fn execute(
        &self,
        state: &mut WorkflowState,
        plan: QueryPlan,
        context: &QueryContext,
        deadline: &Deadline,
    ) -> PathResult<()> {
        // Init -> Planned
        state.intent = plan.intent;
        state.targets = plan.targets.clone();
        state.algorithm = plan.algorithm;
        state.max_hops = plan.max_hops;
        let blast_radius = plan.blast_radius;
        let risk_target = plan.risk_reduction_target;
        state.plan = Some(plan);
        state.advance(Stage::Planned)?;

        // Planned -> Retrieved
        let subgraph = self
            .engine
            .retrieve(&state.targets, state.max_hops, &mut state.notices)?;
        let entry_points = self.engine.entry_points(&mut state.notices)?;
        state.subgraph = Some(Arc::clone(&subgraph));
        state.advance(Stage::Retrieved)?;

        // Retrieved -> Scored
        let mut scoring_notices = Vec::new();
        let ranked = self.engine.score_and_rank(
            &subgraph,
            &entry_points,
            &state.targets,
            state.algorithm,
            state.max_hops,
            deadline,
            &mut scoring_notices,
        )?;
        state.notices.extend(scoring_notices);
        state.algorithm = ranked.algorithm;
        let weights = ranked.weights.clone();
        state.degraded = ranked.unavailable.clone();
        state.paths = ranked.top(context.k.unwrap_or(self.settings.top_k));
        state.advance(Stage::Scored)?;

        // Scored -> Explained
        state.explanations = self.explain(state, &subgraph, context.explain, deadline);
        state.advance(Stage::Explained)?;

        if !state.intent.wants_remediation() {
            return state.advance(Stage::Done);
        }

        // Explained -> RemediateProposed
        let constraints = RemediationConstraints {
            max_actions: context.max_actions,
            max_effort: context.max_effort,
            blast_radius,
            actions_hint: context.actions_hint.clone(),
        };
        let proposal = self.remediator.plan(&state.paths, &subgraph, &constraints);
        if proposal.infeasible {
            state.notice(
                NoticeKind::RemediationInfeasible,
                "no remediation action satisfies the constraints for the top paths",
            );
        }
        let actions = proposal.actions.clone();
        state.remediation = Some(proposal);
        state.advance(Stage::RemediateProposed)?;

        let wants_simulation = context.simulate || state.intent == Intent::SimulateFix;
        if !wants_simulation || actions.is_empty() {
            return state.advance(Stage::Done);
        }

        // RemediateProposed -> Simulated
        let mut rescore_notices = Vec::new();
        let mut result = simulate(&state.paths, &actions, &subgraph, |paths, pruned| {
            self.engine.rescore(paths, pruned, &weights, &mut rescore_notices)
        });
        state.notices.extend(rescore_notices);
        if let Some(target) = risk_target {
            if result.risk_reduction + 1e-9 < target {
                result.recommendations.push(format!(
                    "Requested {:.0}% risk reduction not reached ({:.0}%)",
                    target * 100.0,
                    result.risk_reduction * 100.0
                ));
            }
        }
        state.advance(Stage::Simulated)?;

        // Simulated -> Verified
        if !result.is_consistent() {
            state.notice(
                NoticeKind::SimulationUnavailable,
                format!(
                    "simulated risk {:.3} exceeds original {:.3}, discarding simulation",
                    result.simulated_risk, result.original_risk
                ),
            );
            state.simulation_unavailable = true;
            return state.advance(Stage::Done);
        }
        info!(
            "[{}] simulation: {:.0}% risk reduction, {} paths severed",
            short_id(&state.request_id),
            result.risk_reduction * 100.0,
            result.severed_paths
        );
        state.simulation = Some(result);
        state.advance(Stage::Verified)?;
        state.advance(Stage::Done)
    }

    /// Rule-based plan, overridden by a confident advisor whose target resolves
    fn plan(
        &self,
        state: &mut WorkflowState,
        query: &str,
        crown_jewels: &[Asset],
        deadline: &Deadline,
    ) -> QueryPlan {
        let mut plan = self.planner.plan(query, crown_jewels);
        debug!(
            "Rule plan: intent={} targets={:?} algorithm={} max_hops={}",
            plan.intent, plan.targets, plan.algorithm, plan.max_hops
        );

        let Some(advisor) = &self.planner_advisor else {
            return plan;
        };

        let advisor = Arc::clone(advisor);
        let owned_query = query.to_string();
        let jewels = crown_jewels.to_vec();
        let timeout = deadline.clamp(self.engine.call_timeout());
        let reply = call_with_timeout("planner", timeout, move || advisor.plan(&owned_query, &jewels));

        let advice: AdvisorPlan = match reply {
            Ok(Ok(advice)) => advice,
            Ok(Err(e)) => {
                state.notice(
                    NoticeKind::PlanningAmbiguous,
                    format!("planner advisor failed ({e}), using rule-based plan"),
                );
                return plan;
            }
            Err(e) => {
                state.notice(
                    NoticeKind::PlanningAmbiguous,
                    format!("planner advisor {e}, using rule-based plan"),
                );
                return plan;
            }
        };

        if advice.confidence < self.settings.confidence_threshold {
            state.notice(
                NoticeKind::PlanningAmbiguous,
                format!(
                    "planner advisor confidence {:.2} below {:.2}, using rule-based plan",
                    advice.confidence, self.settings.confidence_threshold
                ),
            );
            return plan;
        }

        let resolved = advice
            .target
            .as_deref()
            .and_then(|t| resolve_crown_jewel(t, crown_jewels));
        let Some(target) = resolved else {
            state.notice(
                NoticeKind::PlanningAmbiguous,
                format!(
                    "planner advisor target {:?} is not a crown jewel, using rule-based plan",
                    advice.target
                ),
            );
            return plan;
        };

        plan.targets = vec![target];
        plan.target_resolved = true;
        if let Some(algorithm) = advice.algorithm {
            plan.algorithm = algorithm;
        }
        if let Some(hops) = advice.max_hops.filter(|h| (1..=MAX_HOPS_LIMIT).contains(h)) {
            plan.max_hops = hops;
        }
        plan.source = PlanSource::Advisor;
        debug!("Advisor plan accepted: {:?}", plan);
        plan
    }

    fn explain(
        &self,
        state: &mut WorkflowState,
        subgraph: &Subgraph,
        use_advisor: bool,
        deadline: &Deadline,
    ) -> Vec<Explanation> {
        let mut explanations = Vec::with_capacity(state.paths.len());
        let mut advisor = self.explainer.as_ref().filter(|_| use_advisor).cloned();

        for path in state.paths.clone() {
            let mut context = ExplainContext::for_path(&path, subgraph);
            if !state.query.is_empty() {
                context = context.with_query(&state.query);
            }

            if let Some(explainer) = advisor.clone() {
                if deadline.expired() {
                    state.notice(
                        NoticeKind::DeadlineExceeded,
                        "deadline reached, using templated explanations",
                    );
                    advisor = None;
                } else {
                    let timeout = deadline.clamp(self.engine.call_timeout());
                    let (p, ctx) = (path.clone(), context.clone());
                    match call_with_timeout("explainer", timeout, move || explainer.explain(&p, &ctx)) {
                        Ok(Ok(text)) => {
                            explanations.push(Explanation {
                                path: path.nodes.clone(),
                                text,
                                source: ExplanationSource::Advisor,
                            });
                            continue;
                        }
                        Ok(Err(e)) => state.notice(
                            NoticeKind::ExplainerUnavailable,
                            format!("explainer advisor failed ({e}), using templated explanations"),
                        ),
                        Err(e) => state.notice(
                            NoticeKind::ExplainerUnavailable,
                            format!("explainer advisor {e}, using templated explanations"),
                        ),
                    }
                    // Do not keep paying the timeout for every path
                    advisor = None;
                }
            }

            explanations.push(Explanation {
                path: path.nodes.clone(),
                text: templated_explanation(&path, &context),
                source: ExplanationSource::Template,
            });
        }
        explanations
    }
}

/// Crown jewel named by `needle`, by id or display name (case-insensitive)
pub fn resolve_crown_jewel(needle: &str, crown_jewels: &[Asset]) -> Option<AssetId> {
    let needle = needle.trim();
    crown_jewels
        .iter()
        .find(|a| a.id == needle)
        .or_else(|| {
            crown_jewels.iter().find(|a| {
                a.id.eq_ignore_ascii_case(needle) || a.display_name().eq_ignore_ascii_case(needle)
            })
        })
        .map(|a| a.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisors::{AdvisorError, AdvisorResult};
    use crate::cache::ResultCache;
    use crate::graph::{GraphAccessor, InMemoryGraphStore};
    use crate::scoring::ScorerEnsemble;

    const GRAPH: &str = r#"{
        "assets": [
            {"id": "web", "type": "compute", "public": true},
            {"id": "vpn", "type": "compute", "public": true},
            {"id": "hub", "type": "compute",
             "vulnerabilities": [{"id": "CVE-2024-1111", "severity": 9.8, "exploit_available": true}]},
            {"id": "db", "name": "crown-jewel-db-001", "type": "database", "critical": true},
            {"id": "bucket", "name": "crown-jewel-bucket-002", "type": "storage", "critical": true}
        ],
        "relationships": [
            {"source": "web", "target": "hub", "type": "connects-to", "exploitability": 0.9},
            {"source": "vpn", "target": "hub", "type": "connects-to"},
            {"source": "hub", "target": "db", "type": "connects-to"},
            {"source": "hub", "target": "bucket", "type": "allows"}
        ]
    }"#;

    fn orchestrator() -> WorkflowOrchestrator {
        let graph: Arc<dyn GraphAccessor> = Arc::new(InMemoryGraphStore::from_json(GRAPH).unwrap());
        let engine = PathEngine::new(
            graph,
            ScorerEnsemble::builder().workers(2).build(),
            ResultCache::default(),
            500,
            Duration::from_secs(2),
        );
        WorkflowOrchestrator::new(
            Arc::new(engine),
            WorkflowSettings {
                deadline: Duration::from_secs(30),
                ..Default::default()
            },
        )
    }

    struct FixedPlanner(AdvisorPlan);
    impl PlannerAdvisor for FixedPlanner {
        fn plan(&self, _: &str, _: &[Asset]) -> AdvisorResult<AdvisorPlan> {
            Ok(self.0.clone())
        }
    }

    struct BrokenExplainer;
    impl ExplainerAdvisor for BrokenExplainer {
        fn explain(&self, _: &AttackPath, _: &ExplainContext) -> AdvisorResult<String> {
            Err(AdvisorError::ApiError {
                status: 503,
                message: "overloaded".into(),
            })
        }
    }

    #[test]
    fn test_find_riskiest_paths_without_advisors() {
        let state = orchestrator().run("Where's my riskiest path to the database?", &QueryContext::default());
        assert_eq!(state.stage, Stage::Done);
        assert_eq!(state.intent, Intent::FindRiskiestPaths);
        assert_eq!(state.targets, vec!["db"]);
        assert_eq!(state.paths.len(), 2);
        assert_eq!(state.explanations.len(), 2);
        assert!(state
            .explanations
            .iter()
            .all(|e| e.source == ExplanationSource::Template));
        assert!(state.remediation.is_none());
        assert!(state.notices.is_empty());
    }

    #[test]
    fn test_simulate_intent_runs_to_verified() {
        let state = orchestrator().run(
            "Simulate hardening the database",
            &QueryContext::default(),
        );
        assert_eq!(state.stage, Stage::Done);
        let plan = state.remediation.as_ref().unwrap();
        assert!(!plan.actions.is_empty());
        let sim = state.simulation.as_ref().unwrap();
        assert!(sim.risk_reduction > 0.0);
        assert!(!state.simulation_unavailable);
    }

    #[test]
    fn test_remediate_without_simulation() {
        let context = QueryContext {
            simulate: false,
            ..Default::default()
        };
        let state = orchestrator().run("fix the risk to my bucket", &context);
        assert_eq!(state.intent, Intent::RemediateRisks);
        assert_eq!(state.targets, vec!["bucket"]);
        assert!(state.remediation.is_some());
        assert!(state.simulation.is_none());
    }

    #[test]
    fn test_confident_advisor_overrides_target() {
        let orch = orchestrator().with_planner_advisor(Arc::new(FixedPlanner(AdvisorPlan {
            target: Some("crown-jewel-bucket-002".into()),
            max_hops: Some(3),
            confidence: 0.9,
            ..Default::default()
        })));
        let state = orch.run("riskiest path to the database", &QueryContext::default());
        assert_eq!(state.targets, vec!["bucket"]);
        assert_eq!(state.max_hops, 3);
        assert_eq!(state.plan.as_ref().unwrap().source, PlanSource::Advisor);
    }

    #[test]
    fn test_unsure_advisor_falls_back() {
        let orch = orchestrator().with_planner_advisor(Arc::new(FixedPlanner(AdvisorPlan {
            target: Some("bucket".into()),
            confidence: 0.3,
            ..Default::default()
        })));
        let state = orch.run("riskiest path to the database", &QueryContext::default());
        assert_eq!(state.targets, vec!["db"]);
        assert!(state
            .notices
            .iter()
            .any(|n| n.kind == NoticeKind::PlanningAmbiguous));
    }

    #[test]
    fn test_failing_explainer_uses_template() {
        let orch = orchestrator().with_explainer(Arc::new(BrokenExplainer));
        let state = orch.run("attack paths to the db", &QueryContext::default());
        assert_eq!(state.stage, Stage::Done);
        assert!(state
            .explanations
            .iter()
            .all(|e| e.source == ExplanationSource::Template));
        let unavailable = state
            .notices
            .iter()
            .filter(|n| n.kind == NoticeKind::ExplainerUnavailable)
            .count();
        assert_eq!(unavailable, 1);
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut state = WorkflowState::new("q");
        assert!(state.advance(Stage::Scored).is_err());
        assert_eq!(state.stage, Stage::Init);
    }

    #[test]
    fn test_resolve_crown_jewel_by_name() {
        let jewels = vec![
            Asset::new("db", crate::models::AssetKind::Database).with_name("crown-jewel-db-001"),
        ];
        assert_eq!(resolve_crown_jewel("Crown-Jewel-DB-001", &jewels), Some("db".into()));
        assert_eq!(resolve_crown_jewel("db", &jewels), Some("db".into()));
        assert_eq!(resolve_crown_jewel("other", &jewels), None);
    }
}
