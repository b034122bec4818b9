//! Transformation generation
//!
//! One strategy per category turns a file's issues into candidate edits.
//! Strategies run independently: one that errors or panics is logged and
//! skipped without affecting the others. Candidates below the minimum
//! confidence are discarded here, before prioritization.

pub mod prioritizer;
pub mod strategies;

use crate::analyzer::DetectorPlugin;
use crate::config::EngineConfig;
use crate::error::{panic_message, PipelineError, PipelineResult};
use crate::models::{Category, Issue, Metrics, Transformation};
use crate::parsers::SourceUnit;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub use prioritizer::{ConflictResolution, DroppedTransformation, Prioritizer};

/// Everything a strategy may look at for one file
pub struct FileContext<'a> {
    pub unit: &'a SourceUnit,
    pub issues: &'a [Issue],
    pub metrics: &'a Metrics,
}

impl<'a> FileContext<'a> {
    pub fn new(unit: &'a SourceUnit, issues: &'a [Issue], metrics: &'a Metrics) -> Self {
        Self {
            unit,
            issues,
            metrics,
        }
    }

    /// Issues with the given rule code
    pub fn issues_with_code<'s>(&'s self, code: &'s str) -> impl Iterator<Item = &'a Issue> + 's {
        let issues: &'a [Issue] = self.issues;
        issues.iter().filter(move |i| i.code == code)
    }

    pub fn has_issue(&self, code: &str) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

/// Produces candidate transformations for one category
pub trait TransformStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn category(&self) -> Category;

    fn analyze(&self, ctx: &FileContext<'_>) -> anyhow::Result<Vec<Transformation>>;
}

/// Extension registered with the engine
#[derive(Clone)]
pub enum Plugin {
    Detector(Arc<dyn DetectorPlugin>),
    Strategy(Arc<dyn TransformStrategy>),
}

impl Plugin {
    pub fn name(&self) -> &'static str {
        match self {
            Plugin::Detector(d) => d.name(),
            Plugin::Strategy(s) => s.name(),
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Plugin::Detector(d) => write!(f, "Plugin::Detector({})", d.name()),
            Plugin::Strategy(s) => write!(f, "Plugin::Strategy({})", s.name()),
        }
    }
}

/// Candidates for one file plus the strategy failures met along the way
#[derive(Debug, Default)]
pub struct Generated {
    pub transformations: Vec<Transformation>,
    pub errors: Vec<PipelineError>,
}

/// Runs every registered strategy over a file
pub struct TransformationGenerator {
    strategies: Vec<Arc<dyn TransformStrategy>>,
    min_confidence: f64,
    categories: Vec<Category>,
}

impl TransformationGenerator {
    /// Generator with the built-in strategy of every category
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            strategies: strategies::builtin(),
            min_confidence: config.confidence_threshold,
            categories: config.categories.clone(),
        }
    }

    /// Generator without any strategy registered
    pub fn empty(min_confidence: f64) -> Self {
        Self {
            strategies: Vec::new(),
            min_confidence,
            categories: Category::all(),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn TransformStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn add_strategy(&mut self, strategy: Arc<dyn TransformStrategy>) {
        self.strategies.push(strategy);
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Run all strategies of enabled categories over one file
    pub fn generate(&self, ctx: &FileContext<'_>) -> Generated {
        let mut out = Generated::default();
        let mut seen = HashSet::new();

        for strategy in &self.strategies {
            if !self.categories.contains(&strategy.category()) {
                continue;
            }
            match run_strategy(strategy.as_ref(), ctx) {
                Ok(candidates) => {
                    let total = candidates.len();
                    let kept: Vec<Transformation> = candidates
                        .into_iter()
                        .filter(|t| t.confidence >= self.min_confidence)
                        .filter(|t| seen.insert(t.id.clone()))
                        .collect();
                    debug!(
                        "Strategy {} proposed {} edits for {} ({} kept)",
                        strategy.name(),
                        total,
                        ctx.unit.path().display(),
                        kept.len()
                    );
                    out.transformations.extend(kept);
                }
                Err(e) => {
                    warn!("Strategy {} failed on {}: {}", strategy.name(), ctx.unit.path().display(), e);
                    out.errors.push(e);
                }
            }
        }
        out
    }
}

fn run_strategy(
    strategy: &dyn TransformStrategy,
    ctx: &FileContext<'_>,
) -> PipelineResult<Vec<Transformation>> {
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| strategy.analyze(ctx)));
    match outcome {
        Ok(Ok(candidates)) => Ok(candidates),
        Ok(Err(e)) => Err(PipelineError::plugin(strategy.name(), format!("{:#}", e))),
        Err(payload) => Err(PipelineError::plugin(
            strategy.name(),
            format!("panicked: {}", panic_message(payload.as_ref())),
        )),
    }
}

#[cfg(test)]
mod tests;
