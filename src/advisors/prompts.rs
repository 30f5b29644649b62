//! Prompt construction and reply parsing for LLM advisors

use serde::Deserialize;

use super::{AdvisorError, AdvisorPlan, AdvisorResult, ExplainContext};
use crate::models::{Algorithm, Asset, AttackPath, Intent};

pub struct PromptBuilder;

impl PromptBuilder {
    pub const PLANNER_SYSTEM: &'static str = "You are a cloud security analyst planning an attack path \
        analysis. Reply with a single JSON object and nothing else.";

    pub const EXPLAINER_SYSTEM: &'static str = "You are a cloud security analyst. Explain attack paths \
        to an engineer in two or three plain sentences. Do not invent assets or vulnerabilities.";

    pub fn plan(query: &str, crown_jewels: &[Asset]) -> String {
        let mut prompt = String::new();
        prompt.push_str("Analyze this security query and extract the analysis plan.\n\n");
        prompt.push_str(&format!("Query: {query}\n\n"));

        prompt.push_str("Available crown jewels:\n");
        if crown_jewels.is_empty() {
            prompt.push_str("- (none)\n");
        }
        for cj in crown_jewels {
            prompt.push_str(&format!("- {} ({}, {})\n", cj.id, cj.display_name(), cj.kind));
        }

        prompt.push_str(
            "\nRespond with JSON:\n\
             {\n  \
               \"intent\": \"find_riskiest_paths\" | \"find_attack_paths\" | \"remediate_risks\" | \"simulate_changes\" | \"general_analysis\",\n  \
               \"target\": \"<crown jewel id or null>\",\n  \
               \"max_hops\": <1-10 or null>,\n  \
               \"algorithm\": \"hybrid\" | \"weighted-cost\" | \"centrality\" | \"motif\" | \"learned\",\n  \
               \"confidence\": <0.0-1.0>\n\
             }\n",
        );
        prompt
    }

    pub fn explain(path: &AttackPath, context: &ExplainContext) -> String {
        let mut prompt = String::new();
        if let Some(query) = &context.query {
            prompt.push_str(&format!("The user asked: {query}\n\n"));
        }
        prompt.push_str(&format!(
            "Attack path ({} hops, risk score {:.2}):\n",
            path.hops, path.hybrid_score
        ));

        for id in &path.nodes {
            match context.asset(id) {
                Some(asset) => {
                    let mut line = format!("- {} [{}]", asset.display_name(), asset.kind);
                    if asset.public {
                        line.push_str(" public");
                    }
                    if asset.critical {
                        line.push_str(" crown-jewel");
                    }
                    for v in asset.worst_vulnerabilities().into_iter().take(3) {
                        line.push_str(&format!(" {} (CVSS {:.1})", v.id, v.severity));
                    }
                    prompt.push_str(&line);
                    prompt.push('\n');
                }
                None => prompt.push_str(&format!("- {id}\n")),
            }
        }

        if !context.hops.is_empty() {
            prompt.push_str("\nHops:\n");
            for hop in &context.hops {
                prompt.push_str(&format!(
                    "- {} -{}-> {} (exploitability {:.2}, exposure {:.2})\n",
                    hop.source,
                    hop.kind,
                    hop.target,
                    hop.features.exploitability,
                    hop.features.exposure
                ));
            }
        }

        prompt.push_str("\nExplain how an attacker would move along this path and why it matters.");
        prompt
    }
}

#[derive(Deserialize)]
struct RawPlan {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    algorithm: Option<String>,
    #[serde(default)]
    max_hops: Option<usize>,
    #[serde(default)]
    confidence: Option<f64>,
}

fn parse_intent(label: &str) -> Option<Intent> {
    match label.trim().to_lowercase().replace('-', "_").as_str() {
        "find_riskiest_paths" | "find_attack_paths" => Some(Intent::FindRiskiestPaths),
        "remediate_risks" | "remediate" => Some(Intent::RemediateRisks),
        "simulate_changes" | "simulate_fix" | "simulate" => Some(Intent::SimulateFix),
        "general_analysis" | "general" => Some(Intent::General),
        _ => None,
    }
}

/// Strip markdown fences and surrounding prose, keep the JSON object
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a planner reply into an [`AdvisorPlan`].
///
/// Unknown intent or algorithm labels are dropped rather than rejected;
/// a missing confidence counts as zero so the plan never overrides.
pub fn parse_plan_reply(text: &str) -> AdvisorResult<AdvisorPlan> {
    let json = extract_json(text)
        .ok_or_else(|| AdvisorError::ParseError("no JSON object in reply".to_string()))?;
    let raw: RawPlan =
        serde_json::from_str(json).map_err(|e| AdvisorError::ParseError(e.to_string()))?;

    let target = raw
        .target
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && t != "null");

    Ok(AdvisorPlan {
        intent: raw.intent.as_deref().and_then(parse_intent),
        target,
        algorithm: raw.algorithm.as_deref().and_then(|a| a.parse::<Algorithm>().ok()),
        max_hops: raw.max_hops.filter(|h| (1..=10).contains(h)),
        confidence: raw
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AssetKind;

    #[test]
    fn test_parse_fenced_reply() {
        let reply = "Here is the plan:\n```json\n{\"intent\": \"find_attack_paths\", \"target\": \"crown-jewel-db-001\", \"max_hops\": 3, \"algorithm\": \"gnn\", \"confidence\": 0.9}\n```";
        let plan = parse_plan_reply(reply).unwrap();
        assert_eq!(plan.intent, Some(Intent::FindRiskiestPaths));
        assert_eq!(plan.target.as_deref(), Some("crown-jewel-db-001"));
        assert_eq!(plan.max_hops, Some(3));
        assert_eq!(plan.algorithm, Some(Algorithm::Learned));
        assert!((plan.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_parse_drops_unknown_fields() {
        let plan = parse_plan_reply(
            r#"{"intent": "dance", "target": "null", "algorithm": "magic", "max_hops": 42}"#,
        )
        .unwrap();
        assert_eq!(plan.intent, None);
        assert_eq!(plan.target, None);
        assert_eq!(plan.algorithm, None);
        assert_eq!(plan.max_hops, None);
        assert_eq!(plan.confidence, 0.0);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_plan_reply("I cannot help with that"),
            Err(AdvisorError::ParseError(_))
        ));
    }

    #[test]
    fn test_plan_prompt_lists_crown_jewels() {
        let cj = Asset::new("crown-jewel-db-001", AssetKind::Database).critical();
        let prompt = PromptBuilder::plan("riskiest path to the db?", &[cj]);
        assert!(prompt.contains("crown-jewel-db-001"));
        assert!(prompt.contains("riskiest path to the db?"));
        assert!(prompt.contains("\"confidence\""));
    }
}
