//! Advisory collaborators for planning and explanation
//!
//! Advisors are optional. The workflow always computes a rule-based plan
//! and a templated explanation; an advisor can only override the plan when
//! it is confident, and its explanations replace the template only when
//! they arrive within the call timeout.
//!
//! # Environment Variables
//!
//! - `PATHWARDEN_ADVISOR`: `none`, `anthropic`, `openai` or `ollama`
//! - `ANTHROPIC_API_KEY`: Required for the Anthropic backend
//! - `OPENAI_API_KEY`: Required for the OpenAI backend

mod llm;
mod prompts;
mod template;

pub use llm::{LlmAdvisor, LlmBackend, LlmClient, LlmConfig, Message, Role};
pub use prompts::{parse_plan_reply, PromptBuilder};
pub use template::{templated_explanation, TemplateExplainer};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::Subgraph;
use crate::models::{Algorithm, Asset, AttackPath, Intent, Relationship};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdvisorError {
    #[error("Missing API key: {env_var} not set. Get your key at {signup_url}")]
    MissingApiKey { env_var: String, signup_url: String },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to parse advisor reply: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

pub type AdvisorResult<T> = Result<T, AdvisorError>;

/// Plan proposed by a planner advisor; unset fields keep the rule result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisorPlan {
    pub intent: Option<Intent>,
    pub target: Option<String>,
    pub algorithm: Option<Algorithm>,
    pub max_hops: Option<usize>,
    /// Self-reported confidence in [0, 1]
    pub confidence: f64,
}

/// Owned view of a path's assets and hops, handed to explainers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExplainContext {
    /// Assets along the path, in path order
    pub assets: Vec<Asset>,
    /// One relationship per hop (the first of any parallel edges)
    pub hops: Vec<Relationship>,
    pub query: Option<String>,
}

impl ExplainContext {
    pub fn for_path(path: &AttackPath, subgraph: &Subgraph) -> Self {
        let assets = path
            .nodes
            .iter()
            .filter_map(|id| subgraph.asset(id).cloned())
            .collect();
        let hops = path
            .edges()
            .filter_map(|(s, t)| subgraph.edges_between(s, t).first().map(|r| (*r).clone()))
            .collect();
        Self {
            assets,
            hops,
            query: None,
        }
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = Some(query.to_string());
        self
    }

    pub fn asset(&self, id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }
}

pub trait PlannerAdvisor: Send + Sync {
    fn plan(&self, query: &str, crown_jewels: &[Asset]) -> AdvisorResult<AdvisorPlan>;
}

pub trait ExplainerAdvisor: Send + Sync {
    fn explain(&self, path: &AttackPath, context: &ExplainContext) -> AdvisorResult<String>;
}
