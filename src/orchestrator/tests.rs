use super::*;
use crate::config::RuntimeMode;
use crate::models::{Category, Severity};
use crate::transform::{FileContext, TransformStrategy};
use crate::validation::runner::{ScriptOutcome, ScriptRunner};
use std::sync::Mutex;
use std::time::Duration;

const FIXTURE: &str = "function load(input) {\n  return eval(input);\n}\n\nfunction same(a, b) {\n  if (a == b) {\n    return 1;\n  }\n  return 0;\n}\n";

fn config(auto_apply: bool) -> EngineConfig {
    EngineConfig {
        auto_apply,
        runtime: RuntimeMode::SyntaxOnly,
        workers: 2,
        ..Default::default()
    }
}

fn write_fixture(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("write fixture");
    path
}

fn recorder() -> (Arc<Mutex<Vec<Stage>>>, StageObserver) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let observer: StageObserver = Box::new(move |stage| sink.lock().expect("lock").push(stage));
    (seen, observer)
}

/// Replaces `1 + 2` with an expression missing its right operand
struct Breaking;

impl TransformStrategy for Breaking {
    fn name(&self) -> &'static str {
        "breaking"
    }
    fn category(&self) -> Category {
        Category::Performance
    }
    fn analyze(&self, ctx: &FileContext<'_>) -> anyhow::Result<Vec<Transformation>> {
        let text = ctx.unit.text();
        let Some(start) = text.find("1 + 2") else {
            return Ok(Vec::new());
        };
        Ok(Transformation::replace(
            ctx.unit.path().to_path_buf(),
            text,
            start,
            start + 5,
            "1 +",
            Category::Performance,
            Severity::Major,
            0.95,
            "fold constant",
        )
        .into_iter()
        .collect())
    }
}

struct Exploding;

impl TransformStrategy for Exploding {
    fn name(&self) -> &'static str {
        "exploding"
    }
    fn category(&self) -> Category {
        Category::Maintainability
    }
    fn analyze(&self, _ctx: &FileContext<'_>) -> anyhow::Result<Vec<Transformation>> {
        anyhow::bail!("no luck")
    }
}

struct NoRuntime;

impl ScriptRunner for NoRuntime {
    fn name(&self) -> &'static str {
        "none"
    }
    fn available(&self) -> bool {
        false
    }
    fn run(&self, _script: &str, _timeout: Duration) -> ScriptOutcome {
        ScriptOutcome::Failed("not available".to_string())
    }
}

#[test]
fn test_dry_run_plans_without_writing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_fixture(&dir, "a.js", FIXTURE);
    let (seen, observer) = recorder();
    let orchestrator = Orchestrator::new(config(false)).expect("config").with_observer(observer);

    let report = orchestrator.run(vec![SourceInput::read(&path).expect("read")]);

    assert!(report.outcome.success);
    assert_eq!(report.outcome.final_stage, "done");
    assert_eq!(report.outcome.files_analyzed, 1);
    assert!(report.issues.iter().any(|i| i.code == "EVAL_USAGE" && i.severity == Severity::Critical));
    assert_eq!(report.outcome.transformations_proposed, 2);
    assert_eq!(report.with_status(TransformationStatus::Approved).count(), 2);
    assert_eq!(report.outcome.transformations_applied, 0);
    assert!(report.outcome.score_after > report.outcome.score_before);
    assert!(report.learning.is_empty());

    assert_eq!(std::fs::read_to_string(&path).expect("read"), FIXTURE);
    assert!(!applier::backup_path(&path).exists());
    assert_eq!(
        *seen.lock().expect("lock"),
        vec![
            Stage::Analyzing,
            Stage::Generating,
            Stage::Prioritizing,
            Stage::Validating,
            Stage::Reporting,
            Stage::Learning,
            Stage::Done
        ]
    );
}

#[test]
fn test_auto_apply_writes_approved_edits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_fixture(&dir, "a.js", FIXTURE);
    let log = Arc::new(MemoryLearningLog::new());
    let (seen, observer) = recorder();
    let orchestrator = Orchestrator::new(config(true))
        .expect("config")
        .with_learning_log(log.clone())
        .with_observer(observer);

    let report = orchestrator.run(vec![SourceInput::read(&path).expect("read")]);

    assert_eq!(report.outcome.transformations_applied, 2);
    assert_eq!(report.outcome.transformations_rejected, 0);
    let written = std::fs::read_to_string(&path).expect("read");
    assert!(written.contains("return JSON.parse(input);"));
    assert!(written.contains("if (a === b)"));
    assert_eq!(
        std::fs::read_to_string(applier::backup_path(&path)).expect("backup"),
        FIXTURE
    );

    let entries = log.entries();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e.succeeded));
    assert_eq!(report.learning, entries);
    assert!(seen.lock().expect("lock").contains(&Stage::Applying));
}

#[test]
fn test_rejected_edit_is_logged_and_not_applied() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = "const total = 1 + 2;\n";
    let path = write_fixture(&dir, "sum.js", source);
    let log = Arc::new(MemoryLearningLog::new());
    let orchestrator = Orchestrator::new(config(true))
        .expect("config")
        .with_learning_log(log.clone())
        .with_plugin(Plugin::Strategy(Arc::new(Breaking)));

    let report = orchestrator.run(vec![SourceInput::read(&path).expect("read")]);

    let rejected: Vec<_> = report.with_status(TransformationStatus::Rejected).collect();
    assert_eq!(rejected.len(), 1);
    let validation = rejected[0].validation.as_ref().expect("validated");
    assert!(!validation.valid);
    assert_eq!(validation.issues[0].kind, ValidationIssueKind::Syntax);
    assert_eq!(report.outcome.transformations_rejected, 1);
    assert_eq!(std::fs::read_to_string(&path).expect("read"), source);

    let entries = log.entries();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].succeeded);
    assert!(entries[0].reason.starts_with("syntax"));
}

#[test]
fn test_review_without_runtime_is_not_applied() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_fixture(&dir, "a.js", FIXTURE);
    let cfg = EngineConfig {
        runtime: RuntimeMode::Auto,
        ..config(true)
    };
    let gate = ValidationGate::with_runner(&cfg, Arc::new(NoRuntime));
    let orchestrator = Orchestrator::with_gate(cfg, gate).expect("config");
    assert_eq!(orchestrator.runtime_name(), None);

    let report = orchestrator.run(vec![SourceInput::read(&path).expect("read")]);

    assert_eq!(report.with_status(TransformationStatus::Review).count(), 2);
    assert_eq!(report.outcome.transformations_applied, 0);
    assert!(report.learning.is_empty());
    assert_eq!(std::fs::read_to_string(&path).expect("read"), FIXTURE);
}

#[test]
fn test_parse_failures_skip_only_that_file() {
    let inputs = vec![
        SourceInput::new("/repo/broken.js", "function (\n"),
        SourceInput::new("/repo/ok.js", "let x = 1;\n"),
    ];
    let report = Orchestrator::new(config(false)).expect("config").run(inputs);

    assert!(report.outcome.success);
    assert_eq!(report.outcome.files_analyzed, 1);
    assert_eq!(report.outcome.files_skipped, 1);
    assert_eq!(report.file_errors.len(), 1);
    assert_eq!(report.file_errors[0].path, PathBuf::from("/repo/broken.js"));
    assert_eq!(report.file_errors[0].stage, Stage::Analyzing);
}

#[test]
fn test_cycles_are_reported() {
    let inputs = vec![
        SourceInput::new("/repo/a.js", "import { b } from \"./b\";\nexport const a = 1;\n"),
        SourceInput::new("/repo/b.js", "import { a } from \"./a\";\nexport const b = a;\n"),
    ];
    let report = Orchestrator::new(config(false)).expect("config").run(inputs);

    assert_eq!(report.cycles.len(), 1);
    assert_eq!(report.cycles[0].len(), 2);
    assert_eq!(
        report
            .issues
            .iter()
            .filter(|i| i.code == "CIRCULAR_DEPENDENCY")
            .count(),
        2
    );
}

#[test]
fn test_strategy_failure_is_captured() {
    let orchestrator = Orchestrator::new(config(false))
        .expect("config")
        .with_plugin(Plugin::Strategy(Arc::new(Exploding)));
    let report = orchestrator.run(vec![SourceInput::new("/repo/a.js", "var x = 1;\n")]);

    assert!(report.outcome.success);
    assert_eq!(report.outcome.final_stage, "done");
    let errors: Vec<_> = report
        .file_errors
        .iter()
        .filter(|e| e.stage == Stage::Generating)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("exploding"));
    // Built-in strategies still ran
    assert!(report.outcome.transformations_proposed >= 1);
}

#[test]
fn test_cancelled_run_ends_in_error() {
    let token = CancellationToken::new();
    token.cancel();
    let (seen, observer) = recorder();
    let orchestrator = Orchestrator::new(config(false))
        .expect("config")
        .with_cancellation(token)
        .with_observer(observer);

    let report = orchestrator.run(vec![SourceInput::new("/repo/a.js", "var x = 1;\n")]);

    assert!(report.outcome.cancelled);
    assert!(report.outcome.success);
    assert_eq!(report.outcome.final_stage, "error");
    assert_eq!(report.outcome.error.as_deref(), Some("run cancelled"));
    assert!(report.transformations.is_empty());
    assert_eq!(*seen.lock().expect("lock"), vec![Stage::Analyzing, Stage::Error]);
}

#[test]
fn test_invalid_config_is_fatal() {
    let bad = EngineConfig {
        confidence_threshold: 1.5,
        ..Default::default()
    };
    assert!(matches!(Orchestrator::new(bad), Err(PipelineError::Config(_))));
}

#[test]
fn test_report_serializes() {
    let report = Orchestrator::new(config(false))
        .expect("config")
        .run(vec![SourceInput::new("/repo/a.js", "if (a == 1) {}\n")]);
    let json = serde_json::to_value(&report).expect("serialize");
    assert_eq!(json["outcome"]["final_stage"], "done");
    assert_eq!(json["transformations"][0]["status"], "approved");
    assert_eq!(json["transformations"][0]["transformation"]["type"], "maintainability");
}
