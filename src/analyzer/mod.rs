//! Issue detection
//!
//! One tree traversal yields the metrics, one lexical pass yields the
//! heuristic issues, and the dependency report contributes cycle issues.
//! Detector plugins add their own `{metrics, issues}` fragments which are
//! merged into the built-in result:
//! - complexity: maximum
//! - maintainability: minimum
//! - duplication ratio: maximum
//! - issues: concatenated
//!
//! A plugin that errors or panics is logged and excluded; the rest of the
//! file's analysis is kept.

pub mod complexity;
pub mod lexical;
pub mod metrics;

use crate::config::{EngineConfig, IgnoreMatcher};
use crate::dependencies::DependencyReport;
use crate::error::{panic_message, PipelineError, PipelineResult};
use crate::models::{AnalysisResult, Category, Issue, Location, Metrics, Severity, TextRange};
use crate::parsers::SourceUnit;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub use metrics::quality_score;

/// Extension point contributing metrics and issues for a file
pub trait DetectorPlugin: Send + Sync {
    /// Plugin name (used in logs and error reports)
    fn name(&self) -> &'static str;

    /// Analyze one parsed file
    fn analyze(&self, unit: &SourceUnit) -> anyhow::Result<AnalysisResult>;
}

/// Analysis of one file plus the plugin failures met along the way
#[derive(Debug, Default)]
pub struct FileAnalysis {
    pub result: AnalysisResult,
    pub plugin_errors: Vec<PipelineError>,
}

/// Built-in analyzer for JavaScript/TypeScript files
pub struct IssueDetector {
    config: Arc<EngineConfig>,
    ignore: Vec<IgnoreMatcher>,
    plugins: Vec<Arc<dyn DetectorPlugin>>,
}

impl IssueDetector {
    pub fn new(config: Arc<EngineConfig>) -> PipelineResult<Self> {
        let ignore = config.ignore_matchers()?;
        Ok(Self {
            config,
            ignore,
            plugins: Vec::new(),
        })
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn DetectorPlugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn add_plugin(&mut self, plugin: Arc<dyn DetectorPlugin>) {
        self.plugins.push(plugin);
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Analyze one file. `deps` contributes circular dependency issues when given.
    pub fn analyze(&self, unit: &SourceUnit, deps: Option<&DependencyReport>) -> FileAnalysis {
        let start = Instant::now();
        let stats = complexity::tree_stats(&unit.root(), unit.text().as_bytes());
        let mut result = AnalysisResult {
            metrics: metrics::file_metrics(&stats, unit.text()),
            issues: lexical_issues(unit),
        };

        if let Some(deps) = deps {
            result.issues.extend(cycle_issues(unit, deps));
        }

        let mut plugin_errors = Vec::new();
        for plugin in &self.plugins {
            match run_plugin(plugin.as_ref(), unit) {
                Ok(fragment) => merge(&mut result, fragment),
                Err(e) => {
                    warn!("Detector plugin {} failed on {}: {}", plugin.name(), unit.path().display(), e);
                    plugin_errors.push(e);
                }
            }
        }

        if let Some(issue) = self.complexity_issue(unit, &result.metrics) {
            result.issues.push(issue);
        }

        result.issues.retain(|issue| self.keep(issue));
        result.issues.sort_by(|a, b| {
            (a.location.line, a.location.column, &a.code).cmp(&(
                b.location.line,
                b.location.column,
                &b.code,
            ))
        });

        debug!(
            "Analyzed {} in {}ms: complexity {}, {} issues",
            unit.path().display(),
            start.elapsed().as_millis(),
            result.metrics.complexity,
            result.issues.len()
        );

        FileAnalysis {
            result,
            plugin_errors,
        }
    }

    fn complexity_issue(&self, unit: &SourceUnit, metrics: &Metrics) -> Option<Issue> {
        if metrics.complexity <= self.config.max_complexity {
            return None;
        }
        let severity = if metrics.complexity > self.config.critical_complexity {
            Severity::Critical
        } else {
            Severity::Major
        };
        let location = Location {
            file: unit.path().to_path_buf(),
            line: 1,
            column: 1,
            range: None,
        };
        Some(
            Issue::new(
                "COMPLEXITY",
                Category::Complexity,
                severity,
                format!(
                    "cyclomatic complexity {} exceeds {}",
                    metrics.complexity, self.config.max_complexity
                ),
                location,
            )
            .with_suggestion("Split branches into smaller functions"),
        )
    }

    fn keep(&self, issue: &Issue) -> bool {
        self.config.category_enabled(issue.category)
            && self.config.severity_allowed(issue.severity)
            && !self
                .ignore
                .iter()
                .any(|m| m.matches(&issue.code, &issue.location.file))
    }
}

fn run_plugin(plugin: &dyn DetectorPlugin, unit: &SourceUnit) -> PipelineResult<AnalysisResult> {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| plugin.analyze(unit)));
    match outcome {
        Ok(Ok(fragment)) => Ok(fragment),
        Ok(Err(e)) => Err(PipelineError::plugin(plugin.name(), format!("{:#}", e))),
        Err(payload) => Err(PipelineError::plugin(
            plugin.name(),
            format!("panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

/// Merge a plugin fragment into the accumulated result
pub fn merge(into: &mut AnalysisResult, fragment: AnalysisResult) {
    let m = &mut into.metrics;
    m.complexity = m.complexity.max(fragment.metrics.complexity);
    m.maintainability = m.maintainability.min(fragment.metrics.maintainability);
    m.duplication_ratio = m.duplication_ratio.max(fragment.metrics.duplication_ratio);
    into.issues.extend(fragment.issues);
}

/// Location of a byte range inside a unit
pub fn location_of(unit: &SourceUnit, range: TextRange) -> Location {
    let (line, column) = unit.lines().position(range.start);
    Location {
        file: unit.path().to_path_buf(),
        line,
        column,
        range: Some(range),
    }
}

fn line_snippet(unit: &SourceUnit, line: u32) -> String {
    unit.text()
        .lines()
        .nth(line.saturating_sub(1) as usize)
        .unwrap_or("")
        .trim()
        .chars()
        .take(120)
        .collect()
}

fn lexical_issues(unit: &SourceUnit) -> Vec<Issue> {
    lexical::scan(unit)
        .into_iter()
        .map(|hit| {
            let location = location_of(unit, hit.range);
            let snippet = line_snippet(unit, location.line);
            Issue::new(hit.code, hit.category, hit.severity, hit.message, location)
                .with_snippet(snippet)
                .with_suggestion(hit.suggestion)
        })
        .collect()
}

/// One issue per cycle this file takes part in, placed at the import continuing the cycle
fn cycle_issues(unit: &SourceUnit, deps: &DependencyReport) -> Vec<Issue> {
    let path = unit.path();
    let mut issues = Vec::new();
    for cycle in &deps.cycles {
        let Some(pos) = cycle.files.iter().position(|f| f == path) else {
            continue;
        };
        let next = &cycle.files[(pos + 1) % cycle.files.len()];
        let line = deps.graph.import_line(path, next).unwrap_or(1);
        let range = unit.lines().line_start(line).map(|s| {
            let end = unit.text()[s..].find('\n').map(|i| s + i).unwrap_or(unit.text().len());
            TextRange::new(s, end)
        });

        let chain: Vec<String> = cycle
            .files
            .iter()
            .chain(cycle.files.first())
            .map(|f| {
                f.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| f.display().to_string())
            })
            .collect();

        let location = Location {
            file: path.to_path_buf(),
            line,
            column: 1,
            range,
        };
        issues.push(
            Issue::new(
                "CIRCULAR_DEPENDENCY",
                Category::Maintainability,
                cycle.severity.issue_severity(),
                format!("circular import: {}", chain.join(" -> ")),
                location,
            )
            .with_snippet(line_snippet(unit, line))
            .with_suggestion("Move the shared code into a module both files import"),
        );
    }
    issues
}
