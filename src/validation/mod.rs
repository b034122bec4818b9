//! Validation gate
//!
//! Every transformation passes through the gate before it may touch a file.
//! Stages run in order and stop at the first critical failure:
//!
//! 0. stale: the file still holds the original text at the edit's range
//! 1. syntax: the edited file parses cleanly
//! 2. runtime: the file up to the edited top-level statement still executes
//!    the way it did
//! 3. test: a differential test of the enclosing named function passes
//! 4. behavior: static cost stays within tolerance and no new critical
//!    lexical issue appears
//!
//! Runtime and test stages need a script runtime. Without one (or for
//! TypeScript sources) they are skipped and the recommendation is capped at
//! `review`, unless the engine was configured for syntax-only validation.

pub mod harness;
pub mod runner;

use crate::analyzer::complexity::static_cost;
use crate::analyzer::lexical;
use crate::config::{EngineConfig, RuntimeMode};
use crate::error::PipelineError;
use crate::models::{
    Category, Severity, TestResults, TextRange, Transformation, ValidationIssue,
    ValidationIssueKind, ValidationResult,
};
use crate::parsers::{check_syntax, Language, SourceUnit};
use harness::{CompareMode, RuntimeReport, TestReport};
use runner::{NodeRunner, ScriptOutcome, ScriptRunner};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Where the execution stages stand for one gate
#[derive(Clone)]
enum Execution {
    Runner(Arc<dyn ScriptRunner>),
    /// No runtime found in auto mode: skip and cap at review
    Unavailable,
    /// Configured away
    Disabled,
    /// Runtime required but missing: every transformation fails
    Missing,
}

pub struct ValidationGate {
    execution: Execution,
    timeout: Duration,
    behavior_tolerance: f64,
}

impl ValidationGate {
    /// Gate resolving its runtime from `config.runtime`
    pub fn new(config: &EngineConfig) -> Self {
        let execution = match config.runtime {
            RuntimeMode::SyntaxOnly => Execution::Disabled,
            RuntimeMode::Auto => match NodeRunner::detect() {
                Some(node) => Execution::Runner(Arc::new(node)),
                None => {
                    info!("node not found; runtime and test validation skipped");
                    Execution::Unavailable
                }
            },
            RuntimeMode::Node => {
                let node = NodeRunner::new();
                if node.available() {
                    Execution::Runner(Arc::new(node))
                } else {
                    Execution::Missing
                }
            }
        };
        Self::with_execution(config, execution)
    }

    /// Gate using the given runner (unless the config disables execution)
    pub fn with_runner(config: &EngineConfig, runner: Arc<dyn ScriptRunner>) -> Self {
        let execution = match config.runtime {
            RuntimeMode::SyntaxOnly => Execution::Disabled,
            RuntimeMode::Node if !runner.available() => Execution::Missing,
            RuntimeMode::Auto if !runner.available() => Execution::Unavailable,
            _ => Execution::Runner(runner),
        };
        Self::with_execution(config, execution)
    }

    fn with_execution(config: &EngineConfig, execution: Execution) -> Self {
        Self {
            execution,
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
            behavior_tolerance: config.behavior_tolerance,
        }
    }

    /// Name of the runtime used for execution stages, if any
    pub fn runtime_name(&self) -> Option<&'static str> {
        match &self.execution {
            Execution::Runner(r) => Some(r.name()),
            _ => None,
        }
    }

    /// Validate one transformation against the file it targets
    pub fn validate(&self, unit: &SourceUnit, t: &Transformation) -> ValidationResult {
        let started = Instant::now();
        let mut issues = Vec::new();
        let mut test_results = None;
        let mut cap_at_review = false;

        let stages = self.run_stages(unit, t, &mut issues, &mut test_results, &mut cap_at_review);
        let mut result = ValidationResult::from_issues(t.id.clone(), issues, test_results, cap_at_review);
        result.duration_ms = started.elapsed().as_millis() as u64;

        debug!(
            "Validated {} ({} stages): valid={} recommendation={}",
            t.id, stages, result.valid, result.recommendation
        );
        result
    }

    /// Returns how many stages ran
    fn run_stages(
        &self,
        unit: &SourceUnit,
        t: &Transformation,
        issues: &mut Vec<ValidationIssue>,
        test_results: &mut Option<TestResults>,
        cap_at_review: &mut bool,
    ) -> usize {
        // 0. stale
        let after_text = match stale_check(unit, t) {
            Ok(text) => text,
            Err(issue) => {
                issues.push(issue);
                return 1;
            }
        };

        // 1. syntax
        let after = match syntax_check(unit, &after_text) {
            Ok(after) => after,
            Err(issue) => {
                issues.push(issue);
                return 2;
            }
        };

        // 2-3. execution
        let mut ran = 2;
        match &self.execution {
            Execution::Runner(_) if unit.language() != Language::JavaScript => {
                *cap_at_review = true;
            }
            Execution::Runner(runner) => {
                ran += 1;
                if let Some(issue) = self.runtime_check(runner.as_ref(), unit, t, &after_text) {
                    issues.push(issue);
                    return ran;
                }
                ran += 1;
                match self.test_check(runner.as_ref(), unit, t, &after_text) {
                    Ok(results) => *test_results = results,
                    Err((issue, results)) => {
                        *test_results = results;
                        issues.push(issue);
                        return ran;
                    }
                }
            }
            Execution::Unavailable => *cap_at_review = true,
            Execution::Disabled => {}
            Execution::Missing => {
                issues.push(ValidationIssue::critical(
                    ValidationIssueKind::Runtime,
                    "node runtime is required but not available",
                ));
                return ran + 1;
            }
        }

        // 4. behavior
        ran += 1;
        issues.extend(self.behavior_check(unit, &after, t));
        ran
    }

    fn runtime_check(
        &self,
        runner: &dyn ScriptRunner,
        unit: &SourceUnit,
        t: &Transformation,
        after_text: &str,
    ) -> Option<ValidationIssue> {
        let stmt = unit.top_level_statement(t.range())?;
        if !stmt.contains(&t.range()) {
            return None;
        }
        // Run everything up to and including the edited statement so earlier
        // bindings are in scope
        let before = &unit.text()[..stmt.end];
        let after = after_text.get(..shift(stmt.end, t))?;

        let script = harness::runtime_script(before, after, self.timeout.as_millis() as u64);
        match runner.run(&script, self.timeout) {
            ScriptOutcome::TimedOut => Some(ValidationIssue::critical(
                ValidationIssueKind::Runtime,
                PipelineError::ValidationTimeout(self.timeout.as_millis() as u64).to_string(),
            )),
            ScriptOutcome::Failed(msg) => Some(ValidationIssue::critical(ValidationIssueKind::Runtime, msg)),
            ScriptOutcome::Completed { stdout, stderr, .. } => {
                match harness::parse_report::<RuntimeReport>(&stdout) {
                    Some(report) => runtime_regression(&report).map(|message| {
                        ValidationIssue::critical(ValidationIssueKind::Runtime, message)
                    }),
                    None => Some(ValidationIssue::critical(
                        ValidationIssueKind::Runtime,
                        format!("runtime check produced no report: {}", stderr.trim()),
                    )),
                }
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn test_check(
        &self,
        runner: &dyn ScriptRunner,
        unit: &SourceUnit,
        t: &Transformation,
        after_text: &str,
    ) -> Result<Option<TestResults>, (ValidationIssue, Option<TestResults>)> {
        let Some(function) = unit.enclosing_function(t.range()) else {
            return Ok(None);
        };
        let before = &unit.text()[function.range.start..function.range.end];
        let Some(after) = after_text.get(function.range.start..shift(function.range.end, t)) else {
            return Ok(None);
        };
        let mode = match t.category {
            Category::Security => CompareMode::Hardening,
            _ => CompareMode::Equivalent,
        };

        let timeout_ms = self.timeout.as_millis() as u64;
        let script = harness::test_script(before, after, &function.name, function.params, mode, timeout_ms);
        let report = match runner.run(&script, self.timeout) {
            ScriptOutcome::TimedOut => {
                return Err((
                    ValidationIssue::critical(
                        ValidationIssueKind::Test,
                        PipelineError::ValidationTimeout(timeout_ms).to_string(),
                    ),
                    None,
                ))
            }
            ScriptOutcome::Failed(msg) => {
                return Err((ValidationIssue::critical(ValidationIssueKind::Test, msg), None))
            }
            ScriptOutcome::Completed { stdout, stderr, .. } => {
                match harness::parse_report::<TestReport>(&stdout) {
                    Some(report) => report,
                    None => {
                        return Err((
                            ValidationIssue::critical(
                                ValidationIssueKind::Test,
                                format!("test harness produced no report: {}", stderr.trim()),
                            ),
                            None,
                        ))
                    }
                }
            }
        };

        if !report.loaded {
            debug!(
                "Skipping differential test of {}: {}",
                function.name,
                report.error.unwrap_or_default()
            );
            return Ok(None);
        }

        let results = TestResults {
            passed: report.passed,
            failed: report.failed,
            total: report.total,
        };
        if report.timed_out {
            return Err((
                ValidationIssue::critical(
                    ValidationIssueKind::Test,
                    PipelineError::ValidationTimeout(timeout_ms).to_string(),
                ),
                Some(results),
            ));
        }
        if report.failed > 0 {
            let detail = report.failures.first().cloned().unwrap_or_default();
            return Err((
                ValidationIssue::critical(
                    ValidationIssueKind::Test,
                    format!(
                        "{} of {} samples of {} changed behavior ({})",
                        report.failed, report.total, function.name, detail
                    ),
                ),
                Some(results),
            ));
        }
        Ok(Some(results))
    }

    fn behavior_check(&self, unit: &SourceUnit, after: &SourceUnit, t: &Transformation) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let region = unit
            .enclosing_function(t.range())
            .map(|f| f.range)
            .or_else(|| unit.top_level_statement(t.range()))
            .filter(|r| r.contains(&t.range()))
            .unwrap_or_else(|| TextRange::new(0, unit.text().len()));
        let after_region = TextRange::new(region.start, shift(region.end, t));

        let before_cost = region_cost(unit, region);
        let after_cost = region_cost(after, after_region);
        let limit = before_cost as f64 * (1.0 + self.behavior_tolerance);
        if after_cost as f64 > limit {
            issues.push(ValidationIssue::warning(
                ValidationIssueKind::Behavior,
                format!("static cost grew from {} to {}", before_cost, after_cost),
            ));
        }

        let critical_before = count_critical(unit);
        let critical_after = count_critical(after);
        if critical_after > critical_before {
            issues.push(ValidationIssue::critical(
                ValidationIssueKind::Behavior,
                "edit introduces a critical issue",
            ));
        }
        issues
    }
}

/// The edited program fails where the original ran, or fails differently
fn runtime_regression(report: &RuntimeReport) -> Option<String> {
    if report.after.ok {
        return None;
    }
    let error = report.after.error.as_deref().unwrap_or("unknown error");
    if report.before.ok {
        return Some(format!("edited code throws: {}", error));
    }
    let original = report.before.error.as_deref().unwrap_or("unknown error");
    (error != original).then(|| format!("edited code throws {} instead of {}", error, original))
}

/// Move an offset at or after the edit by the edit's length change
fn shift(offset: usize, t: &Transformation) -> usize {
    let removed = t.original.end - t.original.start;
    (offset + t.replacement.len()).saturating_sub(removed)
}

fn stale_check(unit: &SourceUnit, t: &Transformation) -> Result<String, ValidationIssue> {
    if t.original.start >= t.original.end || !t.matches(unit.text()) {
        let err = PipelineError::StaleEdit {
            id: t.id.clone(),
            path: t.file_path.clone(),
            start: t.original.start,
            end: t.original.end,
            expected: t.original.text.clone(),
        };
        return Err(ValidationIssue::critical(ValidationIssueKind::Stale, err.to_string()));
    }
    t.apply_to(unit.text())
        .ok_or_else(|| ValidationIssue::critical(ValidationIssueKind::Stale, "edit range out of bounds"))
}

fn syntax_check(unit: &SourceUnit, after_text: &str) -> Result<SourceUnit, ValidationIssue> {
    let diagnostics = check_syntax(unit.language(), after_text)
        .map_err(|e| ValidationIssue::critical(ValidationIssueKind::Syntax, e.to_string()))?;
    if !diagnostics.is_empty() {
        let shown: Vec<String> = diagnostics.iter().take(3).map(|d| d.to_string()).collect();
        return Err(ValidationIssue::critical(
            ValidationIssueKind::Syntax,
            format!("edited file does not parse: {}", shown.join("; ")),
        ));
    }
    SourceUnit::parse(unit.path(), after_text)
        .map_err(|e| ValidationIssue::critical(ValidationIssueKind::Syntax, e.to_string()))
}

fn region_cost(unit: &SourceUnit, region: TextRange) -> u64 {
    let root = unit.root();
    let end = region.end.min(unit.text().len());
    if region.start >= end {
        return static_cost(&root);
    }
    let mut node = root
        .descendant_for_byte_range(region.start, end)
        .unwrap_or(root);
    // Widen to a node covering the whole region
    while node.start_byte() > region.start || node.end_byte() < end {
        match node.parent() {
            Some(p) => node = p,
            None => break,
        }
    }
    static_cost(&node)
}

fn count_critical(unit: &SourceUnit) -> usize {
    lexical::scan(unit)
        .iter()
        .filter(|h| h.severity == Severity::Critical)
        .count()
}
