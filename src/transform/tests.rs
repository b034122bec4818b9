use super::*;
use crate::analyzer::IssueDetector;
use crate::models::Severity;

struct Failing;

impl TransformStrategy for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }
    fn category(&self) -> Category {
        Category::Maintainability
    }
    fn analyze(&self, _ctx: &FileContext<'_>) -> anyhow::Result<Vec<Transformation>> {
        anyhow::bail!("strategy exploded")
    }
}

struct Panicking;

impl TransformStrategy for Panicking {
    fn name(&self) -> &'static str {
        "panicking"
    }
    fn category(&self) -> Category {
        Category::Performance
    }
    fn analyze(&self, _ctx: &FileContext<'_>) -> anyhow::Result<Vec<Transformation>> {
        panic!("boom")
    }
}

/// Proposes one low and one high confidence edit at the start of the file
struct Fixed;

impl TransformStrategy for Fixed {
    fn name(&self) -> &'static str {
        "fixed"
    }
    fn category(&self) -> Category {
        Category::Maintainability
    }
    fn analyze(&self, ctx: &FileContext<'_>) -> anyhow::Result<Vec<Transformation>> {
        let unit = ctx.unit;
        let make = |end: usize, confidence: f64| {
            Transformation::replace(
                unit.path().to_path_buf(),
                unit.text(),
                0,
                end,
                "let",
                Category::Maintainability,
                Severity::Minor,
                confidence,
                "fixed",
            )
        };
        Ok([make(3, 0.3), make(2, 0.99)].into_iter().flatten().collect())
    }
}

fn generate(generator: &TransformationGenerator, source: &str) -> Generated {
    let unit = SourceUnit::parse("/repo/a.js", source).expect("should parse");
    let config = Arc::new(EngineConfig::default());
    let analysis = IssueDetector::new(config).expect("config").analyze(&unit, None).result;
    let ctx = FileContext::new(&unit, &analysis.issues, &analysis.metrics);
    generator.generate(&ctx)
}

#[test]
fn test_builtin_generator_proposes_per_category() {
    let generator = TransformationGenerator::new(&EngineConfig::default());
    assert_eq!(
        generator.strategy_names(),
        vec!["security", "performance", "complexity", "maintainability"]
    );
    let out = generate(&generator, "var data = eval(raw);\nconsole.log(data);\n");
    assert!(out.errors.is_empty());
    let categories: Vec<Category> = out.transformations.iter().map(|t| t.category).collect();
    assert_eq!(
        categories,
        vec![Category::Security, Category::Maintainability, Category::Maintainability]
    );
}

#[test]
fn test_failing_strategies_are_isolated() {
    let generator = TransformationGenerator::empty(0.7)
        .with_strategy(Arc::new(Failing))
        .with_strategy(Arc::new(Panicking))
        .with_strategy(Arc::new(Fixed));
    let out = generate(&generator, "var x = 1;\n");
    assert_eq!(out.errors.len(), 2);
    assert!(out.errors.iter().all(|e| matches!(e, PipelineError::Plugin { .. })));
    assert_eq!(out.transformations.len(), 1);
}

#[test]
fn test_low_confidence_candidates_discarded() {
    let generator = TransformationGenerator::empty(0.5).with_strategy(Arc::new(Fixed));
    let out = generate(&generator, "var x = 1;\n");
    assert_eq!(out.transformations.len(), 1);
    assert!(out.transformations[0].confidence > 0.9);
}

#[test]
fn test_disabled_category_strategy_is_skipped() {
    let config = EngineConfig {
        categories: vec![Category::Security],
        ..Default::default()
    };
    let generator = TransformationGenerator::new(&config);
    let out = generate(&generator, "var data = eval(raw);\nconsole.log(data);\n");
    assert!(out
        .transformations
        .iter()
        .all(|t| t.category == Category::Security));
}

#[test]
fn test_plugin_names() {
    let plugin = Plugin::Strategy(Arc::new(Fixed));
    assert_eq!(plugin.name(), "fixed");
    assert_eq!(format!("{:?}", plugin), "Plugin::Strategy(fixed)");
}
