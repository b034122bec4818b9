//! Pipeline orchestration
//!
//! A run walks `Analyzing → Generating → Prioritizing → Validating →
//! Applying → Reporting → Learning → Done`. Each stage consumes the full
//! output of the previous one; work inside a stage runs in parallel across
//! files on a bounded rayon pool. Cancellation is checked between stages and
//! ends the run in `Error`.
//!
//! Per-file and per-transformation failures are captured in the
//! [`RunReport`]; they never abort the run. Only configuration errors stop
//! an orchestrator from being built.

pub mod learning;

pub use learning::{JsonlLearningLog, LearningLog, MemoryLearningLog};

use crate::analyzer::{quality_score, IssueDetector};
use crate::applier::{self, Applier};
use crate::config::EngineConfig;
use crate::dependencies::{DependencyGraph, DependencyReport};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{
    AnalysisResult, ApprovedTransformation, CircularDependency, Issue, LearningEntry,
    OptimizationOutcome, Recommendation, Transformation, ValidationIssue, ValidationIssueKind,
    ValidationResult,
};
use crate::parsers::SourceUnit;
use crate::transform::{FileContext, Plugin, Prioritizer, TransformationGenerator};
use crate::validation::ValidationGate;
use globset::GlobSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analyzing,
    Generating,
    Prioritizing,
    Validating,
    Applying,
    Reporting,
    Learning,
    Done,
    Error,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Analyzing => "analyzing",
            Stage::Generating => "generating",
            Stage::Prioritizing => "prioritizing",
            Stage::Validating => "validating",
            Stage::Applying => "applying",
            Stage::Reporting => "reporting",
            Stage::Learning => "learning",
            Stage::Done => "done",
            Stage::Error => "error",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Called with every stage the run enters
pub type StageObserver = Box<dyn Fn(Stage) + Send + Sync>;

/// Shared flag aborting a run at the next stage boundary
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One file handed to the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInput {
    pub path: PathBuf,
    pub text: String,
}

impl SourceInput {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    /// Read a file from disk
    pub fn read(path: &Path) -> std::io::Result<Self> {
        Ok(Self::new(path, std::fs::read_to_string(path)?))
    }
}

/// Where a transformation ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformationStatus {
    /// Lost a same-file overlap to a higher-priority candidate
    Dropped,
    /// Failed validation
    Rejected,
    /// Passed validation, but needs a human look before applying
    Review,
    /// Approved for application; auto-apply was off
    Approved,
    Applied,
    /// Approved, but the applier refused it
    NotApplied,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformationRecord {
    pub transformation: Transformation,
    pub status: TransformationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A failure tied to one file
#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub path: PathBuf,
    pub stage: Stage,
    pub message: String,
}

impl FileError {
    fn new(path: impl Into<PathBuf>, stage: Stage, error: &PipelineError) -> Self {
        Self {
            path: path.into(),
            stage,
            message: error.to_string(),
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: OptimizationOutcome,
    pub issues: Vec<Issue>,
    pub transformations: Vec<TransformationRecord>,
    pub cycles: Vec<CircularDependency>,
    pub unresolved: Vec<PathBuf>,
    pub file_errors: Vec<FileError>,
    pub learning: Vec<LearningEntry>,
}

impl RunReport {
    fn new(outcome: OptimizationOutcome) -> Self {
        Self {
            outcome,
            issues: Vec::new(),
            transformations: Vec::new(),
            cycles: Vec::new(),
            unresolved: Vec::new(),
            file_errors: Vec::new(),
            learning: Vec::new(),
        }
    }

    /// Records with the given status
    pub fn with_status(&self, status: TransformationStatus) -> impl Iterator<Item = &TransformationRecord> {
        self.transformations.iter().filter(move |r| r.status == status)
    }
}

struct AnalyzedFile {
    unit: SourceUnit,
    analysis: AnalysisResult,
}

/// Runs the whole pipeline over a set of files
pub struct Orchestrator {
    config: Arc<EngineConfig>,
    exclude: GlobSet,
    detector: IssueDetector,
    generator: TransformationGenerator,
    prioritizer: Prioritizer,
    gate: ValidationGate,
    applier: Applier,
    learning: Arc<dyn LearningLog>,
    observer: Option<StageObserver>,
    cancel: CancellationToken,
    pool: rayon::ThreadPool,
}

impl Orchestrator {
    /// Orchestrator whose gate resolves its runtime from the config
    pub fn new(config: EngineConfig) -> PipelineResult<Self> {
        let gate = ValidationGate::new(&config);
        Self::with_gate(config, gate)
    }

    pub fn with_gate(config: EngineConfig, gate: ValidationGate) -> PipelineResult<Self> {
        config.validate()?;
        let exclude = config.exclude_set()?;
        let workers = config.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| PipelineError::Config(format!("cannot start {} workers: {}", workers, e)))?;

        let config = Arc::new(config);
        Ok(Self {
            detector: IssueDetector::new(Arc::clone(&config))?,
            generator: TransformationGenerator::new(&config),
            prioritizer: Prioritizer::from_config(&config),
            applier: Applier::new(config.keep_backup),
            gate,
            exclude,
            learning: Arc::new(MemoryLearningLog::new()),
            observer: None,
            cancel: CancellationToken::new(),
            pool,
            config,
        })
    }

    pub fn with_learning_log(mut self, log: Arc<dyn LearningLog>) -> Self {
        self.learning = log;
        self
    }

    pub fn with_observer(mut self, observer: StageObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_plugin(mut self, plugin: Plugin) -> Self {
        self.register(plugin);
        self
    }

    /// Register a detector or strategy plugin
    pub fn register(&mut self, plugin: Plugin) {
        debug!("Registering {:?}", plugin);
        match plugin {
            Plugin::Detector(detector) => self.detector.add_plugin(detector),
            Plugin::Strategy(strategy) => self.generator.add_strategy(strategy),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Name of the script runtime used by the gate, if any
    pub fn runtime_name(&self) -> Option<&'static str> {
        self.gate.runtime_name()
    }

    /// Run every stage over `inputs`
    pub fn run(&self, inputs: Vec<SourceInput>) -> RunReport {
        let start = Instant::now();
        let mut report = RunReport::new(OptimizationOutcome::start());
        info!("Run {} over {} files", report.outcome.run_id, inputs.len());

        self.enter(Stage::Analyzing);
        let (files, deps) = self.analyze_stage(inputs, &mut report);
        if self.stop_if_cancelled(&mut report) {
            return report;
        }

        self.enter(Stage::Generating);
        let candidates = self.generate_stage(&files, &mut report);
        if self.stop_if_cancelled(&mut report) {
            return report;
        }

        self.enter(Stage::Prioritizing);
        let plan = self.prioritizer.plan(candidates);
        debug!("Plan: {} kept, {} dropped", plan.kept.len(), plan.dropped.len());
        report
            .transformations
            .extend(plan.dropped.into_iter().map(|d| TransformationRecord {
                transformation: d.transformation,
                status: TransformationStatus::Dropped,
                validation: None,
                reason: Some(d.reason),
            }));
        if self.stop_if_cancelled(&mut report) {
            return report;
        }

        self.enter(Stage::Validating);
        let validated = self.validate_stage(&files, plan.kept);
        report.outcome.transformations_validated = validated.iter().filter(|(_, v)| v.valid).count();
        if self.stop_if_cancelled(&mut report) {
            return report;
        }

        let applied = if self.config.auto_apply {
            self.enter(Stage::Applying);
            let applied = self.apply_stage(&validated, &mut report);
            if self.stop_if_cancelled(&mut report) {
                return report;
            }
            Some(applied)
        } else {
            debug!("Auto-apply is off; nothing written");
            None
        };

        self.enter(Stage::Reporting);
        self.record_validated(validated, applied.as_ref(), &mut report);
        report.outcome.score_after = self.score_after(&files, &deps, &report.transformations);
        report.transformations.sort_by(|a, b| {
            (&a.transformation.file_path, a.transformation.original.start, &a.transformation.id).cmp(&(
                &b.transformation.file_path,
                b.transformation.original.start,
                &b.transformation.id,
            ))
        });
        if self.stop_if_cancelled(&mut report) {
            return report;
        }

        self.enter(Stage::Learning);
        let entries = learning_entries(&report.transformations);
        if let Err(e) = self.learning.append(&entries) {
            warn!("Failed to append {} learning entries: {:#}", entries.len(), e);
        }
        report.learning = entries;

        self.enter(Stage::Done);
        report.outcome.finish(Stage::Done.as_str());
        info!(
            "Run {} done in {}ms: {} proposed, {} validated, {} applied, {} rejected",
            report.outcome.run_id,
            start.elapsed().as_millis(),
            report.outcome.transformations_proposed,
            report.outcome.transformations_validated,
            report.outcome.transformations_applied,
            report.outcome.transformations_rejected
        );
        report
    }

    fn enter(&self, stage: Stage) {
        debug!("Entering stage {}", stage);
        if let Some(observer) = &self.observer {
            observer(stage);
        }
    }

    fn stop_if_cancelled(&self, report: &mut RunReport) -> bool {
        if !self.cancel.is_cancelled() {
            return false;
        }
        info!("Run {} cancelled", report.outcome.run_id);
        report.outcome.cancelled = true;
        report.outcome.error = Some(PipelineError::Cancelled.to_string());
        self.enter(Stage::Error);
        report.outcome.finish(Stage::Error.as_str());
        true
    }

    fn analyze_stage(
        &self,
        inputs: Vec<SourceInput>,
        report: &mut RunReport,
    ) -> (Vec<AnalyzedFile>, DependencyReport) {
        let parsed: Vec<(PathBuf, PipelineResult<SourceUnit>)> = self.pool.install(|| {
            inputs
                .into_par_iter()
                .map(|input| {
                    let path = input.path.clone();
                    (path, SourceUnit::parse(input.path, input.text))
                })
                .collect()
        });

        let mut units = Vec::with_capacity(parsed.len());
        for (path, result) in parsed {
            match result {
                Ok(unit) => units.push(unit),
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    report.outcome.files_skipped += 1;
                    report.file_errors.push(FileError::new(path, Stage::Analyzing, &e));
                }
            }
        }
        units.sort_by(|a, b| a.path().cmp(b.path()));

        let graph = DependencyGraph::build(units.iter(), &self.exclude);
        let deps = DependencyReport::from_graph(graph, self.config.max_depth);

        let analyses: Vec<_> = self.pool.install(|| {
            units
                .par_iter()
                .map(|unit| self.detector.analyze(unit, Some(&deps)))
                .collect()
        });

        let mut files = Vec::with_capacity(units.len());
        let mut scores = Vec::with_capacity(units.len());
        for (unit, analysis) in units.into_iter().zip(analyses) {
            for e in &analysis.plugin_errors {
                report.file_errors.push(FileError::new(unit.path(), Stage::Analyzing, e));
            }
            scores.push(quality_score(&analysis.result.metrics, &analysis.result.issues));
            report.issues.extend(analysis.result.issues.iter().cloned());
            files.push(AnalyzedFile {
                unit,
                analysis: analysis.result,
            });
        }

        report.outcome.files_analyzed = files.len();
        report.outcome.issues_found = report.issues.len();
        report.outcome.score_before = mean(&scores);
        report.cycles = deps.cycles.clone();
        report.unresolved = deps.unresolved.clone();
        (files, deps)
    }

    fn generate_stage(&self, files: &[AnalyzedFile], report: &mut RunReport) -> Vec<Transformation> {
        let generated: Vec<_> = self.pool.install(|| {
            files
                .par_iter()
                .map(|f| {
                    let ctx = FileContext::new(&f.unit, &f.analysis.issues, &f.analysis.metrics);
                    self.generator.generate(&ctx)
                })
                .collect()
        });

        let mut candidates = Vec::new();
        for (file, generated) in files.iter().zip(generated) {
            for e in &generated.errors {
                report.file_errors.push(FileError::new(file.unit.path(), Stage::Generating, e));
            }
            candidates.extend(generated.transformations);
        }
        report.outcome.transformations_proposed = candidates.len();
        candidates
    }

    /// Validate per file in parallel, sequentially within a file in plan order
    fn validate_stage(
        &self,
        files: &[AnalyzedFile],
        kept: Vec<Transformation>,
    ) -> Vec<(Transformation, ValidationResult)> {
        let index: HashMap<&Path, &AnalyzedFile> = files.iter().map(|f| (f.unit.path(), f)).collect();
        let mut by_file: BTreeMap<PathBuf, Vec<Transformation>> = BTreeMap::new();
        for t in kept {
            by_file.entry(t.file_path.clone()).or_default().push(t);
        }

        let results: Vec<Vec<(Transformation, ValidationResult)>> = self.pool.install(|| {
            by_file
                .into_par_iter()
                .map(|(path, transformations)| match index.get(path.as_path()) {
                    Some(file) => transformations
                        .into_iter()
                        .map(|t| {
                            let result = self.gate.validate(&file.unit, &t);
                            (t, result)
                        })
                        .collect(),
                    None => transformations
                        .into_iter()
                        .map(|t| {
                            let issue = ValidationIssue::critical(
                                ValidationIssueKind::Stale,
                                format!("{} is not part of this run", path.display()),
                            );
                            let result = ValidationResult::from_issues(t.id.clone(), vec![issue], None, false);
                            (t, result)
                        })
                        .collect(),
                })
                .collect()
        });
        results.into_iter().flatten().collect()
    }

    /// Apply approved transformations; returns `id -> None` when applied,
    /// `id -> Some(reason)` when refused
    fn apply_stage(
        &self,
        validated: &[(Transformation, ValidationResult)],
        report: &mut RunReport,
    ) -> HashMap<String, Option<String>> {
        let approved: Vec<ApprovedTransformation> =
            validated.iter().filter_map(|(t, v)| v.approve(t)).collect();
        let mut ids_by_file: HashMap<PathBuf, Vec<String>> = HashMap::new();
        for a in &approved {
            ids_by_file.entry(a.file_path.clone()).or_default().push(a.id.clone());
        }

        let results = self.pool.install(|| self.applier.apply_all(approved));

        let mut outcome = HashMap::new();
        for (path, result) in results {
            match result {
                Ok(file) => {
                    for id in file.applied {
                        outcome.insert(id, None);
                    }
                    for rejected in file.rejected {
                        outcome.insert(rejected.transformation_id, Some(rejected.message));
                    }
                }
                Err(e) => {
                    warn!("Failed to apply edits to {}: {}", path.display(), e);
                    for id in ids_by_file.remove(&path).unwrap_or_default() {
                        outcome.insert(id, Some(e.to_string()));
                    }
                    report.file_errors.push(FileError::new(path, Stage::Applying, &e));
                }
            }
        }
        outcome
    }

    fn record_validated(
        &self,
        validated: Vec<(Transformation, ValidationResult)>,
        applied: Option<&HashMap<String, Option<String>>>,
        report: &mut RunReport,
    ) {
        for (t, v) in validated {
            let (status, reason) = if !v.valid {
                (TransformationStatus::Rejected, Some(first_issue(&v)))
            } else if v.recommendation != Recommendation::Apply {
                (TransformationStatus::Review, Some(first_issue(&v)))
            } else {
                match applied.map(|a| a.get(&t.id)) {
                    None => (TransformationStatus::Approved, None),
                    Some(Some(None)) => (TransformationStatus::Applied, None),
                    Some(Some(Some(reason))) => (TransformationStatus::NotApplied, Some(reason.clone())),
                    Some(None) => (TransformationStatus::NotApplied, Some("not applied".to_string())),
                }
            };
            match status {
                TransformationStatus::Applied => report.outcome.transformations_applied += 1,
                TransformationStatus::Rejected | TransformationStatus::NotApplied => {
                    report.outcome.transformations_rejected += 1
                }
                _ => {}
            }
            report.transformations.push(TransformationRecord {
                transformation: t,
                status,
                validation: Some(v),
                reason,
            });
        }
    }

    /// Score of the files with the applied (or, without auto-apply, the
    /// approved) transformations spliced in
    fn score_after(&self, files: &[AnalyzedFile], deps: &DependencyReport, records: &[TransformationRecord]) -> f64 {
        let counted = if self.config.auto_apply {
            TransformationStatus::Applied
        } else {
            TransformationStatus::Approved
        };
        let mut by_file: HashMap<&Path, Vec<&Transformation>> = HashMap::new();
        for r in records.iter().filter(|r| r.status == counted) {
            by_file
                .entry(r.transformation.file_path.as_path())
                .or_default()
                .push(&r.transformation);
        }

        let scores: Vec<f64> = self.pool.install(|| {
            files
                .par_iter()
                .map(|f| {
                    let before = quality_score(&f.analysis.metrics, &f.analysis.issues);
                    let Some(edits) = by_file.get(f.unit.path()) else {
                        return before;
                    };
                    let spliced = applier::splice(f.unit.text(), edits);
                    match SourceUnit::parse(f.unit.path(), spliced.text) {
                        Ok(after) => {
                            let analysis = self.detector.analyze(&after, Some(deps));
                            quality_score(&analysis.result.metrics, &analysis.result.issues)
                        }
                        Err(e) => {
                            debug!("Keeping the original score of {}: {}", f.unit.path().display(), e);
                            before
                        }
                    }
                })
                .collect()
        });
        mean(&scores)
    }
}

fn first_issue(v: &ValidationResult) -> String {
    v.issues
        .first()
        .map(|i| format!("{}: {}", i.kind, i.message))
        .unwrap_or_else(|| "runtime checks skipped".to_string())
}

fn learning_entries(records: &[TransformationRecord]) -> Vec<LearningEntry> {
    records
        .iter()
        .filter_map(|r| {
            let succeeded = match r.status {
                TransformationStatus::Applied => true,
                TransformationStatus::Rejected | TransformationStatus::NotApplied => false,
                _ => return None,
            };
            Some(LearningEntry {
                category: r.transformation.category,
                description: r.transformation.description.clone(),
                succeeded,
                reason: r.reason.clone().unwrap_or_else(|| "applied".to_string()),
            })
        })
        .collect()
}

/// Mean of per-file scores; an empty run scores 100
fn mean(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        100.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

#[cfg(test)]
mod tests;
