//! End-to-end tests of the library API
//!
//! Every run uses syntax-only validation so no script runtime is required.

use codemend::applier::splice;
use codemend::config::{EngineConfig, RuntimeMode};
use codemend::dependencies::{DependencyGraph, DependencyReport};
use codemend::models::{Category, CycleSeverity, Recommendation, Severity, Transformation};
use codemend::orchestrator::{Orchestrator, SourceInput, TransformationStatus};
use codemend::parsers::SourceUnit;
use codemend::transform::Prioritizer;
use codemend::validation::ValidationGate;
use std::path::PathBuf;

fn syntax_only() -> EngineConfig {
    EngineConfig {
        runtime: RuntimeMode::SyntaxOnly,
        workers: 2,
        ..Default::default()
    }
}

fn eval_fix(unit: &SourceUnit, replacement: &str) -> Transformation {
    let start = unit.text().find("eval(userInput)").expect("eval call");
    Transformation::replace(
        unit.path().to_path_buf(),
        unit.text(),
        start,
        start + "eval(userInput)".len(),
        replacement,
        Category::Security,
        Severity::Critical,
        0.8,
        "Replace eval() with JSON.parse()",
    )
    .expect("valid range")
}

#[test]
fn test_eval_scenario() {
    let source = "function parse(userInput) {\n  return eval(userInput);\n}\n";
    let report = Orchestrator::new(syntax_only())
        .expect("config")
        .run(vec![SourceInput::new("/repo/parse.js", source)]);

    let evals: Vec<_> = report.issues.iter().filter(|i| i.code == "EVAL_USAGE").collect();
    assert_eq!(evals.len(), 1);
    assert_eq!(evals[0].severity, Severity::Critical);
    assert_eq!(evals[0].category, Category::Security);

    let fix = report
        .transformations
        .iter()
        .find(|r| r.transformation.category == Category::Security)
        .expect("security fix proposed");
    assert_eq!(fix.transformation.replacement, "JSON.parse(userInput)");
    assert_eq!(fix.status, TransformationStatus::Approved);

    // The gate accepts the well-formed fix and rejects one missing a paren
    let unit = SourceUnit::parse("/repo/parse.js", source).expect("parse");
    let gate = ValidationGate::new(&syntax_only());
    let good = gate.validate(&unit, &eval_fix(&unit, "JSON.parse(userInput)"));
    assert!(good.valid);
    assert_eq!(good.recommendation, Recommendation::Apply);
    let bad = gate.validate(&unit, &eval_fix(&unit, "JSON.parse(userInput"));
    assert!(!bad.valid);
    assert_eq!(bad.recommendation, Recommendation::Reject);
}

#[test]
fn test_invalid_transformation_is_never_approved() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("parse.js");
    let source = "function parse(userInput) {\n  return eval(userInput);\n}\n";
    std::fs::write(&path, source).expect("write");

    let unit = SourceUnit::parse(&path, source).expect("parse");
    let broken = eval_fix(&unit, "JSON.parse(userInput");
    let result = ValidationGate::new(&syntax_only()).validate(&unit, &broken);
    // An invalid result cannot be turned into something the applier accepts
    assert!(result.approve(&broken).is_none());
    assert_eq!(std::fs::read_to_string(&path).expect("read"), source);
}

#[test]
fn test_round_trip_and_offset_safety() {
    let source = "var a = x == 1;\nvar b = y != 2;\n";
    let path = PathBuf::from("/repo/eq.js");
    let edit = |find: &str, replacement: &str| {
        let start = source.find(find).expect("present");
        Transformation::replace(
            path.clone(),
            source,
            start,
            start + find.len(),
            replacement,
            Category::Maintainability,
            Severity::Minor,
            0.8,
            "strict equality",
        )
        .expect("valid")
    };
    let first = edit("==", "===");
    let second = edit("!=", "!==");

    let forward = splice(source, &[&first, &second]);
    let backward = splice(source, &[&second, &first]);
    assert_eq!(forward.text, backward.text);
    assert_eq!(forward.text, "var a = x === 1;\nvar b = y !== 2;\n");

    let single = first.apply_to(source).expect("in bounds");
    let start = first.original.start;
    assert_eq!(&single[start..start + first.replacement.len()], "===");
}

#[test]
fn test_cycle_classification_and_idempotence() {
    let two = DependencyGraph::from_edges([("/r/a.js", "/r/b.js", 1), ("/r/b.js", "/r/a.js", 1)]);
    let three = DependencyGraph::from_edges([
        ("/r/a.js", "/r/b.js", 1),
        ("/r/b.js", "/r/c.js", 1),
        ("/r/c.js", "/r/a.js", 1),
    ]);
    let six = DependencyGraph::from_edges((0..6).map(|i| {
        (
            format!("/r/{}.js", i),
            format!("/r/{}.js", (i + 1) % 6),
            1,
        )
    }));

    let r2 = DependencyReport::from_graph(two, 10);
    assert_eq!(r2.cycles.len(), 1);
    assert_eq!(r2.cycles[0].len(), 2);
    assert_eq!(r2.cycles[0].severity, CycleSeverity::High);

    let r3 = DependencyReport::from_graph(three, 10);
    assert_eq!(r3.cycles.len(), 1);
    assert_eq!(r3.cycles[0].severity, CycleSeverity::High);

    let r6 = DependencyReport::from_graph(six, 10);
    assert_eq!(r6.cycles.len(), 1);
    assert_eq!(r6.cycles[0].severity, CycleSeverity::Low);

    let again = DependencyReport::from_graph(
        DependencyGraph::from_edges([("/r/b.js", "/r/a.js", 1), ("/r/a.js", "/r/b.js", 1)]),
        10,
    );
    assert_eq!(again.cycles, r2.cycles);
}

#[test]
fn test_low_confidence_never_prioritized() {
    let source = "let a = 1;\n";
    let make = |confidence: f64| {
        Transformation::replace(
            PathBuf::from("/repo/a.js"),
            source,
            0,
            3,
            "var",
            Category::Maintainability,
            Severity::Minor,
            confidence,
            "test",
        )
        .expect("valid")
    };
    let prioritizer = Prioritizer::new(Category::all(), 0.7);
    let plan = prioritizer.plan(vec![make(0.5)]);
    assert!(plan.kept.is_empty());
    assert!(plan.dropped.is_empty());
    assert_eq!(prioritizer.plan(vec![make(0.9)]).kept.len(), 1);
}

#[test]
fn test_apply_run_updates_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = dir.path().join("a.js");
    let b = dir.path().join("b.js");
    std::fs::write(&a, "import { b } from \"./b.js\";\nexport const a = b == 1;\n").expect("write");
    std::fs::write(&b, "import { a } from \"./a.js\";\nexport const b = 1;\nconsole.log(a);\n").expect("write");

    let config = EngineConfig {
        auto_apply: true,
        keep_backup: false,
        ..syntax_only()
    };
    let inputs = vec![
        SourceInput::read(&a).expect("read a"),
        SourceInput::read(&b).expect("read b"),
    ];
    let report = Orchestrator::new(config).expect("config").run(inputs);

    assert_eq!(report.cycles.len(), 1);
    assert_eq!(report.outcome.transformations_applied, 2);
    assert_eq!(
        std::fs::read_to_string(&a).expect("read"),
        "import { b } from \"./b.js\";\nexport const a = b === 1;\n"
    );
    assert_eq!(
        std::fs::read_to_string(&b).expect("read"),
        "import { a } from \"./a.js\";\nexport const b = 1;\n"
    );
    assert_eq!(report.learning.len(), 2);
}
