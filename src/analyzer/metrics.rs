//! Maintainability, duplication and quality score
//!
//! Maintainability uses the classic index
//! `171 - 5.2 ln(V) - 0.23 CC - 16.2 ln(LOC)` rescaled to 0-100, with the
//! Halstead volume `V` approximated from leaf tokens.

use super::complexity::TreeStats;
use crate::models::{Issue, Metrics, Severity};
use std::collections::HashMap;

/// Lines per duplication window
const DUPLICATION_WINDOW: usize = 4;

/// Lines shorter than this (after trimming) are ignored for duplication
const MIN_SIGNIFICANT_LINE: usize = 4;

pub fn maintainability_index(stats: &TreeStats, lines: usize) -> f64 {
    if stats.tokens == 0 {
        return 100.0;
    }
    let vocabulary = stats.distinct_tokens.max(2) as f64;
    let volume = (stats.tokens as f64 * vocabulary.log2()).max(1.0);
    let loc = (lines.max(1)) as f64;
    let raw = 171.0 - 5.2 * volume.ln() - 0.23 * stats.complexity as f64 - 16.2 * loc.ln();
    (raw * 100.0 / 171.0).clamp(0.0, 100.0)
}

/// Share of significant lines that belong to a repeated block of
/// [`DUPLICATION_WINDOW`] consecutive significant lines
pub fn duplication_ratio(text: &str) -> f64 {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| l.len() >= MIN_SIGNIFICANT_LINE && !l.starts_with("//"))
        .collect();
    if lines.len() < DUPLICATION_WINDOW * 2 {
        return 0.0;
    }

    let mut seen: HashMap<&[&str], usize> = HashMap::new();
    let mut duplicated = vec![false; lines.len()];
    for start in 0..=lines.len() - DUPLICATION_WINDOW {
        let window = &lines[start..start + DUPLICATION_WINDOW];
        match seen.get(window) {
            Some(&first) if first + DUPLICATION_WINDOW <= start => {
                for flag in &mut duplicated[start..start + DUPLICATION_WINDOW] {
                    *flag = true;
                }
                for flag in &mut duplicated[first..first + DUPLICATION_WINDOW] {
                    *flag = true;
                }
            }
            Some(_) => {}
            None => {
                seen.insert(window, start);
            }
        }
    }

    let count = duplicated.iter().filter(|d| **d).count();
    count as f64 / lines.len() as f64
}

/// Build the metrics snapshot for one file
pub fn file_metrics(stats: &TreeStats, text: &str) -> Metrics {
    let lines = text.lines().count();
    Metrics {
        complexity: stats.complexity,
        maintainability: maintainability_index(stats, lines),
        duplication_ratio: duplication_ratio(text),
        lines,
        functions: stats.functions,
    }
}

fn severity_penalty(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 10.0,
        Severity::Major => 5.0,
        Severity::Minor => 2.0,
        Severity::Info => 0.5,
    }
}

/// Quality score of one file: maintainability minus issue penalties, 0-100
pub fn quality_score(metrics: &Metrics, issues: &[Issue]) -> f64 {
    let penalty: f64 = issues.iter().map(|i| severity_penalty(i.severity)).sum();
    (metrics.maintainability - penalty).clamp(0.0, 100.0)
}
