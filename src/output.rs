// src/output.rs

//! Human-readable and JSON rendering of command results.

use std::fmt::Write as _;

use serde::Serialize;

use crate::convoy::{AddOutcome, CheckOutcome, Convoy, ConvoyDetail, ConvoySummary, StrandedConvoy};
use crate::errors::Result;
use crate::launch::{ItemOutcome, LaunchReport};
use crate::staging::{StageReport, StagingError};

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[derive(Serialize)]
struct StageAndLaunch<'a> {
    stage: &'a StageReport,
    launch: &'a LaunchReport,
}

pub fn stage_and_launch_json(stage: &StageReport, launch: &LaunchReport) -> Result<String> {
    to_json(&StageAndLaunch { stage, launch })
}

#[derive(Serialize)]
struct Rejection<'a> {
    errors: &'a [StagingError],
}

/// Findings of a rejected staging run.
pub fn rejection_json(errors: &[StagingError]) -> Result<String> {
    to_json(&Rejection { errors })
}

pub fn stage_report(report: &StageReport) -> String {
    let mut out = String::new();
    let verb = if report.restaged { "Re-staged" } else { "Staged" };
    let _ = writeln!(out, "{verb} {} \"{}\" [{}]", report.convoy_id, report.title, report.status);

    for wave in &report.waves {
        let _ = writeln!(out, "  Wave {}:", wave.number);
        for item in &wave.items {
            let target = item.target.as_deref().unwrap_or("-");
            let _ = writeln!(out, "    {:<16} {:<12} {}", item.id, target, item.title);
        }
    }

    if !report.warnings.is_empty() {
        let _ = writeln!(out, "  Warnings:");
        for w in &report.warnings {
            let _ = writeln!(out, "    - {w}");
        }
    }
    out
}

pub fn launch_report(report: &LaunchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Launched {}: {} of {} wave-1 items dispatched ({} waves total)",
        report.convoy_id,
        report.dispatched(),
        report.items.len(),
        report.waves
    );
    for item in &report.items {
        let target = item.target.as_deref().unwrap_or("-");
        let line = match &item.outcome {
            ItemOutcome::Dispatched => format!("ok      {} -> {target}", item.id),
            ItemOutcome::Failed { reason } => format!("FAILED  {} -> {target}: {reason}", item.id),
            ItemOutcome::Skipped { reason } => format!("skipped {}: {reason}", item.id),
        };
        let _ = writeln!(out, "  {line}");
    }
    out
}

pub fn convoy_created(convoy: &Convoy) -> String {
    format!(
        "Created {} \"{}\" tracking {} item(s)\n",
        convoy.id,
        convoy.title,
        convoy.tracked.len()
    )
}

pub fn add_outcome(outcome: &AddOutcome) -> String {
    let mut out = format!("Added {} item(s) to {}", outcome.added.len(), outcome.convoy_id);
    if outcome.reopened {
        out.push_str(" (reopened)");
    }
    out.push('\n');
    out
}

pub fn check_outcomes(outcomes: &[CheckOutcome]) -> String {
    if outcomes.is_empty() {
        return "No open convoys.\n".to_string();
    }
    let mut out = String::new();
    for o in outcomes {
        let state = if o.auto_closed { "closed" } else { "open" };
        let _ = writeln!(out, "{} {}/{} done, {state}", o.convoy_id, o.closed, o.total);
    }
    out
}

pub fn convoy_list(convoys: &[ConvoySummary]) -> String {
    if convoys.is_empty() {
        return "No convoys.\n".to_string();
    }
    let mut out = String::new();
    for c in convoys {
        let _ = writeln!(
            out,
            "{:<14} {:<16} {:>3}/{:<3} {}",
            c.id,
            c.status.as_str(),
            c.closed,
            c.total,
            c.title
        );
    }
    out
}

pub fn convoy_detail(detail: &ConvoyDetail) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} \"{}\" [{}]", detail.id, detail.title, detail.status);
    let _ = writeln!(out, "  Progress: {}/{}", detail.closed, detail.items.len());
    for item in &detail.items {
        let status = item.status.map(|s| s.as_str()).unwrap_or("unknown");
        let assignee = item.assignee.as_deref().unwrap_or("");
        let _ = writeln!(out, "  {:<16} {:<12} {:<24} {}", item.id, status, assignee, item.title);
    }
    out
}

pub fn stranded(list: &[StrandedConvoy]) -> String {
    if list.is_empty() {
        return "No stranded convoys.\n".to_string();
    }
    let mut out = String::new();
    for s in list {
        if s.ready_count == 0 {
            let _ = writeln!(out, "{} \"{}\": all items closed", s.convoy_id, s.title);
        } else {
            let _ = writeln!(
                out,
                "{} \"{}\": {} ready ({})",
                s.convoy_id,
                s.title,
                s.ready_count,
                s.ready_item_ids.join(", ")
            );
        }
    }
    out
}
