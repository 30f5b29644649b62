//! CLI command definitions and handlers

mod output;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::advisors::{ExplainerAdvisor, LlmAdvisor, LlmClient, PlannerAdvisor};
use crate::config::EngineConfig;
use crate::graph::InMemoryGraphStore;
use crate::remediation::BlastRadius;
use crate::service::{AnalyzeRequest, AttackPathService, RemediateRequest};
use crate::workflow::QueryContext;

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > 64 {
        Err("workers cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// Pathwarden - attack path analysis over asset graphs
#[derive(Parser, Debug)]
#[command(name = "pathwarden")]
#[command(
    version,
    about = "Find, score and remediate attack paths to your crown jewels",
    after_help = "\
Examples:
  pathwarden --graph infra.json crown-jewels
  pathwarden --graph infra.json analyze --target crown-jewel-db-001 -k 5
  pathwarden --graph infra.json query \"Where's my riskiest path to the database?\"
  pathwarden --graph infra.json remediate --hint patch --format json"
)]
pub struct Cli {
    /// JSON graph snapshot to analyze
    #[arg(long, global = true, env = "PATHWARDEN_GRAPH")]
    pub graph: Option<PathBuf>,

    /// Config file (default: ./pathwarden.toml, then the user config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    /// Number of scoring workers (1-64)
    #[arg(long, global = true, value_parser = parse_workers)]
    pub workers: Option<usize>,

    /// Ignore any configured advisor backend
    #[arg(long, global = true)]
    pub no_advisor: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rank the riskiest attack paths to a target
    Analyze {
        /// Asset id or crown-jewel name (default: every crown jewel)
        #[arg(long, short = 't')]
        target: Option<String>,

        /// hybrid, weighted-cost, centrality, motif or learned
        #[arg(long, short = 'a')]
        algorithm: Option<String>,

        /// Maximum path length in hops (1-10)
        #[arg(long)]
        max_hops: Option<usize>,

        /// Number of paths to return
        #[arg(short = 'k')]
        k: Option<usize>,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Ask a free-text question about attack paths
    Query {
        /// The question, e.g. "Where's my riskiest path to the database?"
        text: String,

        /// Restrict remediation to these action kinds or asset ids
        #[arg(long = "hint")]
        hints: Vec<String>,

        /// Propose remediations without simulating them
        #[arg(long)]
        no_simulate: bool,

        /// Number of paths to return
        #[arg(short = 'k')]
        k: Option<usize>,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Propose and simulate fixes for the riskiest paths to every crown jewel
    Remediate {
        /// Restrict remediation to these action kinds or asset ids
        #[arg(long = "hint")]
        hints: Vec<String>,

        /// Propose remediations without simulating them
        #[arg(long)]
        no_simulate: bool,

        /// Maximum number of actions
        #[arg(long)]
        max_actions: Option<usize>,

        /// Maximum total effort
        #[arg(long)]
        max_effort: Option<f64>,

        /// Change budget
        #[arg(long, value_enum, ignore_case = true)]
        blast_radius: Option<BlastRadius>,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// List the crown-jewel assets in the graph
    CrownJewels {
        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    let service = build_service(&cli)?;

    match cli.command {
        Commands::Analyze {
            target,
            algorithm,
            max_hops,
            k,
            format,
        } => {
            let request = AnalyzeRequest {
                target,
                algorithm,
                max_hops,
                k,
            };
            let response = service.analyze(&request)?;
            if format == "json" {
                output::print_json(&response)
            } else {
                output::print_analyze(&response);
                Ok(())
            }
        }

        Commands::Query {
            text,
            hints,
            no_simulate,
            k,
            format,
        } => {
            let context = QueryContext {
                actions_hint: hints,
                simulate: !no_simulate,
                k,
                ..Default::default()
            };
            let response = service.query(&text, &context)?;
            if format == "json" {
                output::print_json(&response)
            } else {
                output::print_query(&response);
                Ok(())
            }
        }

        Commands::Remediate {
            hints,
            no_simulate,
            max_actions,
            max_effort,
            blast_radius,
            format,
        } => {
            let request = RemediateRequest {
                actions_hint: hints,
                simulate: !no_simulate,
                max_actions,
                max_effort,
                blast_radius,
            };
            let response = service.remediate(&request)?;
            if format == "json" {
                output::print_json(&response)
            } else {
                output::print_remediate(&response);
                Ok(())
            }
        }

        Commands::CrownJewels { format } => {
            let jewels = service.crown_jewels()?;
            if format == "json" {
                output::print_json(&jewels)
            } else {
                output::print_crown_jewels(&jewels);
                Ok(())
            }
        }
    }
}

fn build_service(cli: &Cli) -> Result<AttackPathService> {
    let Some(graph_path) = cli.graph.as_deref() else {
        bail!("no graph snapshot given; pass --graph FILE or set PATHWARDEN_GRAPH");
    };

    let mut config = EngineConfig::load(cli.config.as_deref());
    if let Some(workers) = cli.workers {
        config.workers.count = workers;
    }

    let store = load_graph(graph_path)?;
    let advisor = if cli.no_advisor {
        None
    } else {
        build_advisor(&config)
    };

    let service = AttackPathService::new(Arc::new(store), config);
    Ok(match advisor {
        Some(advisor) => {
            let planner: Arc<dyn PlannerAdvisor> = advisor.clone();
            let explainer: Arc<dyn ExplainerAdvisor> = advisor;
            service.with_advisors(Some(planner), Some(explainer))
        }
        None => service,
    })
}

fn load_graph(path: &Path) -> Result<InMemoryGraphStore> {
    if !path.exists() {
        bail!("Graph snapshot does not exist: {}", path.display());
    }
    InMemoryGraphStore::load(path)
        .with_context(|| format!("Failed to load graph snapshot {}", path.display()))
}

/// The configured advisor, or `None` when disabled or unusable
fn build_advisor(config: &EngineConfig) -> Option<Arc<LlmAdvisor>> {
    let llm_config = match config.advisor.llm_config(config.timeouts.call_timeout()) {
        Ok(Some(c)) => c,
        Ok(None) => return None,
        Err(e) => {
            warn!("{:#}; running without an advisor", e);
            return None;
        }
    };
    match LlmClient::from_env(llm_config) {
        Ok(client) => {
            info!("Advisor: {:?} ({})", client.backend(), client.model());
            Some(Arc::new(LlmAdvisor::new(client)))
        }
        Err(e) => {
            warn!("{}; running without an advisor", e);
            None
        }
    }
}
