//! Deterministic explanation used when no explainer advisor answers

use super::{AdvisorResult, ExplainContext, ExplainerAdvisor};
use crate::models::{AttackPath, Vulnerability};

/// One-sentence explanation built from the assets along `path`.
///
/// `Public-facing compute 'web' → with exploitable vulnerabilities:
/// CVE-2024-0001 (CVSS: 9.8) → enables lateral movement through 2 hops →
/// to reach critical asset 'crown-jewel-db-001'.`
pub fn templated_explanation(path: &AttackPath, context: &ExplainContext) -> String {
    let (Some(entry_id), Some(target_id)) = (path.entry(), path.target()) else {
        return "No attack path found.".to_string();
    };

    let mut parts: Vec<String> = Vec::new();

    match context.asset(entry_id) {
        Some(entry) if entry.public => parts.push(format!(
            "Public-facing {} '{}'",
            entry.kind,
            entry.display_name()
        )),
        Some(entry) => parts.push(format!("Entry point {} '{}'", entry.kind, entry.display_name())),
        None => parts.push(format!("Entry point '{entry_id}'")),
    }

    let mut vulns: Vec<&Vulnerability> = path
        .nodes
        .iter()
        .filter_map(|id| context.asset(id))
        .flat_map(|a| a.vulnerabilities.iter())
        .filter(|v| v.exploit_available)
        .collect();
    vulns.sort_by(|a, b| b.severity.total_cmp(&a.severity).then_with(|| a.id.cmp(&b.id)));
    vulns.dedup_by(|a, b| a.id == b.id);
    if !vulns.is_empty() {
        let desc: Vec<String> = vulns
            .iter()
            .take(3)
            .map(|v| format!("{} (CVSS: {:.1})", v.id, v.severity))
            .collect();
        parts.push(format!("with exploitable vulnerabilities: {}", desc.join(", ")));
    }

    if path.nodes.len() > 2 {
        parts.push(format!(
            "enables lateral movement through {} hops",
            path.nodes.len() - 2
        ));
    }

    match context.asset(target_id) {
        Some(target) if target.critical => {
            parts.push(format!("to reach critical asset '{}'", target.display_name()))
        }
        Some(target) => parts.push(format!("to reach '{}'", target.display_name())),
        None => parts.push(format!("to reach '{target_id}'")),
    }

    parts.join(" → ") + "."
}

/// [`ExplainerAdvisor`] that never fails
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateExplainer;

impl ExplainerAdvisor for TemplateExplainer {
    fn explain(&self, path: &AttackPath, context: &ExplainContext) -> AdvisorResult<String> {
        Ok(templated_explanation(path, context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Subgraph;
    use crate::models::{Asset, AssetKind, RelationKind, Relationship};

    fn subgraph() -> Subgraph {
        Subgraph::from_parts(
            vec![
                Asset::new("web", AssetKind::Compute).public(),
                Asset::new("app", AssetKind::Compute).with_vulnerability(Vulnerability {
                    id: "CVE-2024-0001".into(),
                    severity: 9.8,
                    exploit_available: true,
                }),
                Asset::new("cache", AssetKind::Compute).with_vulnerability(Vulnerability {
                    id: "CVE-2020-9999".into(),
                    severity: 5.0,
                    exploit_available: false,
                }),
                Asset::new("db", AssetKind::Database)
                    .with_name("crown-jewel-db-001")
                    .critical(),
            ],
            vec![
                Relationship::new("web", "app", RelationKind::ConnectsTo),
                Relationship::new("app", "cache", RelationKind::ConnectsTo),
                Relationship::new("cache", "db", RelationKind::ConnectsTo),
            ],
        )
    }

    #[test]
    fn test_full_template() {
        let g = subgraph();
        let path = AttackPath::new(vec!["web".into(), "app".into(), "cache".into(), "db".into()]);
        let ctx = ExplainContext::for_path(&path, &g);
        assert_eq!(
            templated_explanation(&path, &ctx),
            "Public-facing compute 'web' → with exploitable vulnerabilities: CVE-2024-0001 (CVSS: 9.8) \
             → enables lateral movement through 2 hops → to reach critical asset 'crown-jewel-db-001'."
        );
    }

    #[test]
    fn test_direct_hop() {
        let g = subgraph();
        let path = AttackPath::new(vec!["app".into(), "cache".into()]);
        let ctx = ExplainContext::for_path(&path, &g);
        let text = TemplateExplainer.explain(&path, &ctx).unwrap();
        assert!(text.starts_with("Entry point compute 'app'"));
        assert!(!text.contains("lateral movement"));
        assert!(text.ends_with("to reach 'cache'."));
    }

    #[test]
    fn test_empty_path() {
        let path = AttackPath::new(Vec::new());
        assert_eq!(
            templated_explanation(&path, &ExplainContext::default()),
            "No attack path found."
        );
    }
}
