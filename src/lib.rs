//! Pathwarden - attack path discovery, scoring and remediation planning
//!
//! Given an asset-relationship graph, pathwarden enumerates bounded attack
//! paths from public entry points to crown-jewel assets, scores them with
//! an ensemble of graph algorithms, explains them, and proposes and
//! simulates remediations at the choke points they share.
//!
//! The entry point for library users is [`service::AttackPathService`].

pub mod advisors;
pub mod cache;
pub mod cli;
pub mod config;
pub mod deadline;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod models;
pub mod paths;
pub mod remediation;
pub mod scoring;
pub mod service;
pub mod workflow;

pub use errors::{PathError, PathResult};
pub use service::{
    AnalyzeRequest, AnalyzeResponse, AttackPathService, QueryResponse, RemediateRequest,
    RemediateResponse,
};
