//! Run summary output (text or JSON)

use anyhow::{Context, Result};
use codemend::models::Severity;
use codemend::orchestrator::{RunReport, TransformationStatus};
use console::style;
use std::path::Path;

fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .ok()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Line of the issue a transformation fixes, if known
fn line_of(report: &RunReport, issue_id: Option<&str>) -> Option<u32> {
    let id = issue_id?;
    report.issues.iter().find(|i| i.id == id).map(|i| i.location.line)
}

fn status_label(status: TransformationStatus) -> String {
    match status {
        TransformationStatus::Applied => style("applied ").green().to_string(),
        TransformationStatus::Approved => style("approved").green().to_string(),
        TransformationStatus::Review => style("review  ").yellow().to_string(),
        TransformationStatus::Rejected => style("rejected").red().to_string(),
        TransformationStatus::NotApplied => style("failed  ").red().to_string(),
        TransformationStatus::Dropped => style("dropped ").dim().to_string(),
    }
}

/// Render the report as plain text
pub(super) fn format_text(report: &RunReport, root: &Path) -> String {
    let o = &report.outcome;
    let mut out = String::new();

    out.push_str(&format!("\n{} {}\n", style("codemend").bold(), style(&o.run_id).dim()));
    if o.cancelled {
        out.push_str(&format!("  {}\n", style("Run cancelled").yellow()));
    }

    out.push_str(&format!(
        "  Files:  {} analyzed, {} skipped\n",
        style(o.files_analyzed).cyan(),
        o.files_skipped
    ));

    let count = |s: Severity| report.issues.iter().filter(|i| i.severity == s).count();
    out.push_str(&format!(
        "  Issues: {} ({} critical, {} major, {} minor, {} info)\n",
        style(o.issues_found).cyan(),
        style(count(Severity::Critical)).red(),
        count(Severity::Major),
        count(Severity::Minor),
        count(Severity::Info)
    ));

    if !report.cycles.is_empty() {
        out.push_str(&format!("  Cycles: {}\n", style(report.cycles.len()).yellow()));
        for cycle in &report.cycles {
            let mut names: Vec<String> = cycle.files.iter().map(|f| display_path(f, root)).collect();
            if let Some(first) = names.first().cloned() {
                names.push(first);
            }
            out.push_str(&format!("    {} ({:?})\n", names.join(" -> "), cycle.severity));
        }
    }

    out.push_str(&format!(
        "  Transformations: {} proposed, {} validated, {} applied, {} rejected\n",
        o.transformations_proposed,
        o.transformations_validated,
        style(o.transformations_applied).green(),
        o.transformations_rejected
    ));
    out.push_str(&format!(
        "  Score:  {:.1} -> {:.1} ({:+.1})\n",
        o.score_before, o.score_after, o.score_delta
    ));

    let shown: Vec<_> = report
        .transformations
        .iter()
        .filter(|r| r.status != TransformationStatus::Dropped)
        .collect();
    if !shown.is_empty() {
        out.push_str(&format!("\n{}\n", style("Transformations").bold()));
        for record in shown {
            let t = &record.transformation;
            let location = match line_of(report, t.issue_id.as_deref()) {
                Some(line) => format!("{}:{}", display_path(&t.file_path, root), line),
                None => format!("{}@{}", display_path(&t.file_path, root), t.original.start),
            };
            out.push_str(&format!("  {}  {}  {}", status_label(record.status), location, t.description));
            if let Some(reason) = &record.reason {
                out.push_str(&format!(" {}", style(format!("({})", reason)).dim()));
            }
            out.push('\n');
        }
    }

    if !report.file_errors.is_empty() {
        out.push_str(&format!("\n{}\n", style("Errors").bold()));
        for e in &report.file_errors {
            out.push_str(&format!("  {} [{}] {}\n", display_path(&e.path, root), e.stage, e.message));
        }
    }
    out
}

/// Print (or write) the report in the requested format
pub(super) fn emit(report: &RunReport, format: &str, output: Option<&Path>, root: &Path) -> Result<()> {
    let rendered = match format {
        "json" => serde_json::to_string_pretty(report).context("Failed to serialize report")?,
        _ => format_text(report, root),
    };

    match output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Exit with code 1 if any issue is at or above `--fail-on`
pub(super) fn check_fail_threshold(fail_on: Option<&str>, report: &RunReport) {
    let Some(threshold) = fail_on else { return };
    let limit = match threshold {
        "critical" => Severity::Critical,
        "major" => Severity::Major,
        "minor" => Severity::Minor,
        _ => Severity::Info,
    };
    if report.issues.iter().any(|i| i.severity.rank() <= limit.rank()) {
        eprintln!("Failing due to --fail-on={} threshold", threshold);
        std::process::exit(1);
    }
}
