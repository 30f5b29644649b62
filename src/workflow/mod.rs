//! Query workflow: planning, the stage machine and its orchestrator

pub mod orchestrator;
pub mod planner;
pub mod state;

pub use orchestrator::{
    resolve_crown_jewel, Explanation, ExplanationSource, QueryContext, WorkflowOrchestrator,
    WorkflowSettings, WorkflowState,
};
pub use planner::{PlanSource, QueryPlan, RulePlanner};
pub use state::{allowed_transitions, validate_transition, Stage};
