//! Text and JSON rendering for CLI responses

use anyhow::{Context, Result};
use console::style;
use serde::Serialize;

use crate::models::{Asset, AttackPath, Notice};
use crate::service::{AnalyzeResponse, QueryResponse, RemediateResponse, RemediationSummary};

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize response")?;
    println!("{json}");
    Ok(())
}

pub fn print_analyze(response: &AnalyzeResponse) {
    println!(
        "\n{} to {} ({}, max {} hops)\n",
        style("Attack paths").bold(),
        style(response.targets.join(", ")).cyan(),
        response.algorithm,
        response.max_hops
    );
    print_paths(&response.paths);
    if !response.degraded.is_empty() {
        println!(
            "\n  {} scored without: {}",
            style("[!]").yellow(),
            response.degraded.join(", ")
        );
    }
    print_notices(&response.notices);
    println!("\n  {}", style(format!("{}ms", response.latency_ms)).dim());
}

pub fn print_query(response: &QueryResponse) {
    if let Some(plan) = &response.plan {
        println!(
            "\n{} {} (targets: {}, {}, max {} hops)",
            style("Intent:").bold(),
            style(plan.intent).cyan(),
            if plan.targets.is_empty() {
                "none".to_string()
            } else {
                plan.targets.join(", ")
            },
            plan.algorithm,
            plan.max_hops
        );
    }
    println!();
    print_paths(&response.paths);

    if !response.explanations.is_empty() {
        println!("\n{}", style("Explanations").bold());
        for (i, explanation) in response.explanations.iter().enumerate() {
            println!("  {}. {}", i + 1, explanation.text);
        }
    }

    if let Some(remediation) = &response.remediation {
        print_remediation(remediation);
    }
    print_notices(&response.notices);
    println!("\n  {}", style(format!("{}ms", response.latency_ms)).dim());
}

pub fn print_remediate(response: &RemediateResponse) {
    println!(
        "\n{} for {} paths",
        style("Remediation").bold(),
        response.paths.len()
    );
    print_remediation(&response.remediation);
    print_notices(&response.notices);
    println!("\n  {}", style(format!("{}ms", response.latency_ms)).dim());
}

pub fn print_crown_jewels(jewels: &[Asset]) {
    if jewels.is_empty() {
        println!("No crown jewels in this graph.");
        return;
    }
    println!("\n{}\n", style("Crown jewels").bold());
    for asset in jewels {
        println!(
            "  {} {} ({})",
            style(&asset.id).cyan(),
            asset.display_name(),
            asset.kind.as_str()
        );
    }
}

fn print_paths(paths: &[AttackPath]) {
    if paths.is_empty() {
        println!("  No attack paths found.");
        return;
    }
    for (i, path) in paths.iter().enumerate() {
        println!(
            "  {}. [{}] {} ({} hops)",
            i + 1,
            risk_style(path.hybrid_score),
            path.display(),
            path.hops
        );
    }
}

fn print_remediation(summary: &RemediationSummary) {
    if summary.remediation_infeasible || summary.actions.is_empty() {
        println!("\n  {} No remediation possible for these paths.", style("[--]").dim());
        return;
    }

    println!("\n{}", style("Actions").bold());
    for action in &summary.actions {
        println!(
            "  {} {} {} (priority {:.2}, effort {:.1}, {})",
            style(&action.id).dim(),
            style(action.kind).cyan(),
            action.assets.join(" -> "),
            action.priority,
            action.effort,
            action.phase.as_str()
        );
    }
    if !summary.estimated_timeline.is_empty() {
        println!("  Timeline: {}", summary.estimated_timeline);
    }

    if summary.simulation_unavailable {
        println!("\n  {} Simulation unavailable.", style("[!]").yellow());
    } else if let (Some(reduction), Some(before), Some(after)) = (
        summary.risk_reduction,
        summary.original_risk,
        summary.simulated_risk,
    ) {
        println!(
            "\n  Risk {:.2} -> {:.2} ({} reduction)",
            before,
            after,
            style(format!("{:.0}%", reduction * 100.0)).green().bold()
        );
    }
    for rec in &summary.recommendations {
        println!("  - {rec}");
    }
}

fn print_notices(notices: &[Notice]) {
    for notice in notices {
        println!("  {} {}", style("[!]").yellow(), notice.message);
    }
}

fn risk_style(score: f64) -> console::StyledObject<String> {
    let text = format!("{score:.2}");
    if score >= 0.7 {
        style(text).red().bold()
    } else if score >= 0.4 {
        style(text).yellow()
    } else {
        style(text).green()
    }
}
