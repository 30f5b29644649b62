//! Rule-based query planning
//!
//! Keyword rules turn a free-text question into an intent, a set of
//! target crown jewels, an algorithm, a hop bound and remediation
//! constraints. The result is always usable; an advisor may override parts
//! of it when confident.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::models::{Algorithm, Asset, AssetId, AssetKind, Intent};
use crate::remediation::BlastRadius;

/// Upper bound on hops accepted from any source
pub const MAX_HOPS_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    #[default]
    Rules,
    Advisor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub intent: Intent,
    /// Crown jewels to analyze; all of them when the query names none
    pub targets: Vec<AssetId>,
    /// Whether the query (or advisor) pinned specific targets
    pub target_resolved: bool,
    pub algorithm: Algorithm,
    pub max_hops: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blast_radius: Option<BlastRadius>,
    /// Requested risk reduction as a fraction, from "reduce risk by 60%"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_reduction_target: Option<f64>,
    pub source: PlanSource,
}

#[derive(Debug, Clone, Copy)]
pub struct RulePlanner {
    default_max_hops: usize,
}

impl RulePlanner {
    pub fn new(default_max_hops: usize) -> Self {
        Self {
            default_max_hops: default_max_hops.clamp(1, MAX_HOPS_LIMIT),
        }
    }

    pub fn plan(&self, query: &str, crown_jewels: &[Asset]) -> QueryPlan {
        let matched = match_targets(query, crown_jewels);
        let target_resolved = matched.is_some();
        let targets =
            matched.unwrap_or_else(|| crown_jewels.iter().map(|a| a.id.clone()).collect());

        QueryPlan {
            intent: parse_intent(query),
            targets,
            target_resolved,
            algorithm: extract_algorithm(query).unwrap_or_default(),
            max_hops: extract_max_hops(query).unwrap_or(self.default_max_hops),
            blast_radius: extract_blast_radius(query),
            risk_reduction_target: extract_risk_reduction(query),
            source: PlanSource::Rules,
        }
    }
}

/// Whether `phrase` occurs in `haystack` as whole words (a plural `s` is allowed).
/// Both sides must already be lowercase.
fn contains_word(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    let is_word = |c: char| c.is_alphanumeric();
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(phrase) {
        let start = from + pos;
        let end = start + phrase.len();
        let before_ok = haystack[..start].chars().next_back().map_or(true, |c| !is_word(c));
        let rest = &haystack[end..];
        let rest = rest.strip_prefix('s').unwrap_or(rest);
        let after_ok = rest.chars().next().map_or(true, |c| !is_word(c));
        if before_ok && after_ok {
            return true;
        }
        from = start + phrase.chars().next().map_or(1, char::len_utf8);
    }
    false
}

fn contains_any(haystack: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_word(haystack, p))
}

/// Path finding beats remediation beats simulation.
pub fn parse_intent(query: &str) -> Intent {
    let q = query.to_lowercase();
    if contains_any(&q, &["riskiest", "highest risk", "attack path", "path to", "paths to"]) {
        Intent::FindRiskiestPaths
    } else if contains_any(&q, &["fix", "remediate", "remediation", "reduce risk", "mitigate"]) {
        Intent::RemediateRisks
    } else if contains_any(&q, &["simulate", "simulation", "what if", "what-if"]) {
        Intent::SimulateFix
    } else {
        Intent::General
    }
}

/// Crown jewels the query refers to, by id, name or asset-type word.
///
/// Exact id/name mentions win over type words. `None` when nothing
/// matched, so the caller can fall back to every crown jewel.
pub fn match_targets(query: &str, crown_jewels: &[Asset]) -> Option<Vec<AssetId>> {
    let q = query.to_lowercase();

    let named: Vec<AssetId> = crown_jewels
        .iter()
        .filter(|a| {
            contains_word(&q, &a.id.to_lowercase())
                || (!a.name.is_empty() && contains_word(&q, &a.name.to_lowercase()))
        })
        .map(|a| a.id.clone())
        .collect();
    if !named.is_empty() {
        return Some(named);
    }

    let kinds: Vec<AssetKind> = crown_jewels
        .iter()
        .map(|a| a.kind)
        .filter(|k| contains_any(&q, k.aliases()))
        .collect();
    if kinds.is_empty() {
        return None;
    }
    Some(
        crown_jewels
            .iter()
            .filter(|a| kinds.contains(&a.kind))
            .map(|a| a.id.clone())
            .collect(),
    )
}

pub fn extract_algorithm(query: &str) -> Option<Algorithm> {
    let q = query.to_lowercase();
    [
        (&["pagerank", "centrality"][..], Algorithm::Centrality),
        (&["dijkstra", "weighted cost", "weighted-cost", "cheapest"][..], Algorithm::WeightedCost),
        (&["motif", "pattern"][..], Algorithm::Motif),
        (&["gnn", "learned"][..], Algorithm::Learned),
        (&["hybrid"][..], Algorithm::Hybrid),
    ]
    .into_iter()
    .find(|(words, _)| contains_any(&q, words))
    .map(|(_, algorithm)| algorithm)
}

fn hops_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(\d{1,2})[\s-]*hops?\b").expect("valid regex"))
}

fn percent_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,3})\s*%").expect("valid regex"))
}

/// "within 3 hops", "2-hop"; out-of-range values are ignored
pub fn extract_max_hops(query: &str) -> Option<usize> {
    hops_regex()
        .captures(query)
        .and_then(|c| c[1].parse::<usize>().ok())
        .filter(|h| (1..=MAX_HOPS_LIMIT).contains(h))
}

/// "reduce risk by 60%" -> 0.6
pub fn extract_risk_reduction(query: &str) -> Option<f64> {
    percent_regex()
        .captures(query)
        .and_then(|c| c[1].parse::<u32>().ok())
        .filter(|p| *p <= 100)
        .map(|p| f64::from(p) / 100.0)
}

pub fn extract_blast_radius(query: &str) -> Option<BlastRadius> {
    let q = query.to_lowercase();
    if contains_any(&q, &["minimal", "small", "smallest"]) {
        Some(BlastRadius::Minimal)
    } else if contains_word(&q, "limited") {
        Some(BlastRadius::Limited)
    } else if contains_word(&q, "moderate") {
        Some(BlastRadius::Moderate)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jewels() -> Vec<Asset> {
        vec![
            Asset::new("crown-jewel-bucket-002", AssetKind::Storage).critical(),
            Asset::new("crown-jewel-db-001", AssetKind::Database).critical(),
            Asset::new("crown-jewel-role-003", AssetKind::Role).critical(),
        ]
    }

    #[test]
    fn test_riskiest_path_to_database() {
        let plan = RulePlanner::new(4).plan("Where's my riskiest path to the database?", &jewels());
        assert_eq!(plan.intent, Intent::FindRiskiestPaths);
        assert_eq!(plan.targets, vec!["crown-jewel-db-001"]);
        assert!(plan.target_resolved);
        assert_eq!(plan.algorithm, Algorithm::Hybrid);
        assert_eq!(plan.max_hops, 4);
    }

    #[test]
    fn test_intent_precedence() {
        assert_eq!(
            parse_intent("How do I fix the riskiest attack path?"),
            Intent::FindRiskiestPaths
        );
        assert_eq!(parse_intent("Simulate a fix on the gateway"), Intent::RemediateRisks);
        assert_eq!(parse_intent("Reduce risk to the bucket"), Intent::RemediateRisks);
        assert_eq!(parse_intent("What if we simulate patching the db?"), Intent::SimulateFix);
        assert_eq!(parse_intent("show attack paths"), Intent::FindRiskiestPaths);
        assert_eq!(parse_intent("tell me about my cloud"), Intent::General);
        // "prefix" is not "fix"
        assert_eq!(parse_intent("what is the prefix list"), Intent::General);
    }

    #[test]
    fn test_unmatched_target_means_all_crown_jewels() {
        let plan = RulePlanner::new(4).plan("what's exposed?", &jewels());
        assert!(!plan.target_resolved);
        assert_eq!(plan.targets.len(), 3);
    }

    #[test]
    fn test_exact_id_beats_type_word() {
        let targets = match_targets("is crown-jewel-role-003 reachable from the db?", &jewels());
        assert_eq!(targets, Some(vec!["crown-jewel-role-003".to_string()]));
        assert_eq!(
            match_targets("any path to my S3 buckets", &jewels()),
            Some(vec!["crown-jewel-bucket-002".to_string()])
        );
    }

    #[test]
    fn test_constraints_from_text() {
        assert_eq!(extract_max_hops("paths within 3 hops"), Some(3));
        assert_eq!(extract_max_hops("a 2-hop path"), Some(2));
        assert_eq!(extract_max_hops("within 40 hops"), None);
        assert_eq!(extract_risk_reduction("cut risk by 60%"), Some(0.6));
        assert_eq!(extract_risk_reduction("no numbers"), None);
        assert_eq!(
            extract_blast_radius("fix it with minimal disruption"),
            Some(BlastRadius::Minimal)
        );
        assert_eq!(extract_blast_radius("limited changes only"), Some(BlastRadius::Limited));
        assert_eq!(extract_blast_radius("just fix it"), None);
        assert_eq!(extract_algorithm("rank by pagerank"), Some(Algorithm::Centrality));
        assert_eq!(extract_algorithm("use dijkstra"), Some(Algorithm::WeightedCost));
    }
}
