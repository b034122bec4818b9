//! Engine configuration
//!
//! Loads per-project configuration from `codemend.toml` or `.codemendrc.json`
//! in the target root. Every option has a default, so an empty file (or no
//! file at all) is a valid configuration.
//!
//! # Configuration Format
//!
//! ```toml
//! # codemend.toml
//! max_complexity = 10
//! critical_complexity = 20
//! confidence_threshold = 0.7
//! type_priority_order = ["security", "performance", "complexity", "maintainability"]
//! severity_filter = ["critical", "major", "minor"]
//! max_depth = 10
//! timeout_ms = 5000
//! auto_apply = false
//! keep_backup = true
//! runtime = "auto"
//! exclude = ["**/node_modules/**", "**/dist/**"]
//!
//! [[ignore]]
//! code = "CONSOLE_LOG"
//! path = "scripts/**"
//! ```
//!
//! camelCase keys (`maxComplexity`, `confidenceThreshold`, ...) are accepted
//! as aliases.

use crate::error::{PipelineError, PipelineResult};
use crate::models::{Category, Severity};
use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Built-in exclusion patterns for dependency resolution and discovery
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "**/node_modules/**",
    "**/bower_components/**",
    "**/dist/**",
    "**/*.min.js",
    "**/*.bundle.js",
];

/// How the validation gate executes code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeMode {
    /// Use `node` when installed; otherwise skip execution stages and cap at review
    #[default]
    Auto,
    /// Require `node`; a missing runtime fails validation
    Node,
    /// Only syntax and behavior stages run
    SyntaxOnly,
}

/// Drop issues matching a rule code and/or a path glob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IgnoreRule {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Complexity above which a COMPLEXITY issue is raised
    #[serde(alias = "maxComplexity")]
    pub max_complexity: u32,

    /// Complexity above which that issue becomes critical
    #[serde(alias = "criticalComplexity")]
    pub critical_complexity: u32,

    /// Issue severities to keep
    #[serde(alias = "severityFilter")]
    pub severity_filter: Vec<Severity>,

    /// Issue categories to detect
    #[serde(alias = "enabledCategories")]
    pub categories: Vec<Category>,

    /// Transformations below this confidence never reach validation
    #[serde(alias = "confidenceThreshold")]
    pub confidence_threshold: f64,

    /// Tie-breaker order between categories of equal severity
    #[serde(alias = "typePriorityOrder")]
    pub type_priority_order: Vec<Category>,

    /// Depth limit for the cycle search
    #[serde(alias = "maxDepth")]
    pub max_depth: usize,

    /// Timeout for each script execution during validation
    #[serde(alias = "timeoutMs")]
    pub timeout_ms: u64,

    /// Write approved transformations to disk
    #[serde(alias = "autoApply")]
    pub auto_apply: bool,

    /// Keep a `.bak` copy of every rewritten file
    #[serde(alias = "keepBackup")]
    pub keep_backup: bool,

    /// Worker threads (0 = auto-detect)
    pub workers: usize,

    pub runtime: RuntimeMode,

    /// Allowed relative growth of the static cost proxy before review
    #[serde(alias = "behaviorTolerance")]
    pub behavior_tolerance: f64,

    /// Glob patterns excluded from dependency edges and discovery
    pub exclude: Vec<String>,

    pub ignore: Vec<IgnoreRule>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_complexity: 10,
            critical_complexity: 20,
            severity_filter: Severity::all(),
            categories: Category::all(),
            confidence_threshold: 0.7,
            type_priority_order: Category::all(),
            max_depth: 10,
            timeout_ms: 5_000,
            auto_apply: false,
            keep_backup: true,
            workers: 0,
            runtime: RuntimeMode::Auto,
            behavior_tolerance: 0.25,
            exclude: DEFAULT_EXCLUDE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            ignore: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Check every option; a failure here is fatal at startup
    pub fn validate(&self) -> PipelineResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(PipelineError::Config(format!(
                "confidence_threshold must be within 0..1, got {}",
                self.confidence_threshold
            )));
        }
        if self.max_complexity == 0 {
            return Err(PipelineError::Config(
                "max_complexity must be at least 1".to_string(),
            ));
        }
        if self.critical_complexity < self.max_complexity {
            return Err(PipelineError::Config(format!(
                "critical_complexity ({}) must not be below max_complexity ({})",
                self.critical_complexity, self.max_complexity
            )));
        }
        if self.max_depth == 0 {
            return Err(PipelineError::Config("max_depth must be at least 1".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(PipelineError::Config("timeout_ms must be positive".to_string()));
        }
        if !self.behavior_tolerance.is_finite() || self.behavior_tolerance < 0.0 {
            return Err(PipelineError::Config(format!(
                "behavior_tolerance must be a non-negative number, got {}",
                self.behavior_tolerance
            )));
        }
        let mut seen = HashSet::new();
        for category in &self.type_priority_order {
            if !seen.insert(*category) {
                return Err(PipelineError::Config(format!(
                    "type_priority_order lists '{}' twice",
                    category
                )));
            }
        }
        self.exclude_set()?;
        self.ignore_matchers()?;
        Ok(())
    }

    /// Effective worker count
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            std::thread::available_parallelism()
                .map(|p| p.get())
                .unwrap_or(4)
                .min(16)
        } else {
            self.workers
        }
    }

    /// Compiled exclude globs
    pub fn exclude_set(&self) -> PipelineResult<GlobSet> {
        build_glob_set(&self.exclude)
    }

    /// Compiled ignore rules
    ///
    /// A relative path pattern such as `scripts/**` matches that directory
    /// anywhere in an absolute path, so rules written relative to the project
    /// root apply to the absolute paths the engine sees.
    pub fn ignore_matchers(&self) -> PipelineResult<Vec<IgnoreMatcher>> {
        self.ignore
            .iter()
            .map(|rule| {
                let path = match &rule.path {
                    Some(p) => Some(ignore_path_set(p)?),
                    None => None,
                };
                Ok(IgnoreMatcher {
                    code: rule.code.clone(),
                    path,
                })
            })
            .collect()
    }

    pub fn category_enabled(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    pub fn severity_allowed(&self, severity: Severity) -> bool {
        self.severity_filter.contains(&severity)
    }
}

/// A compiled [`IgnoreRule`]
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    code: Option<String>,
    path: Option<GlobSet>,
}

impl IgnoreMatcher {
    /// A rule with neither code nor path ignores nothing
    pub fn matches(&self, code: &str, path: &Path) -> bool {
        if self.code.is_none() && self.path.is_none() {
            return false;
        }
        let code_ok = self.code.as_deref().map_or(true, |c| c == code);
        let path_ok = self.path.as_ref().map_or(true, |m| m.is_match(path));
        code_ok && path_ok
    }
}

fn ignore_path_set(pattern: &str) -> PipelineResult<GlobSet> {
    let invalid = |e: globset::Error| PipelineError::Config(format!("invalid ignore glob '{}': {}", pattern, e));
    let glob = |p: &str| GlobBuilder::new(p).literal_separator(true).build();
    let mut builder = GlobSetBuilder::new();
    builder.add(glob(pattern).map_err(invalid)?);
    if !pattern.starts_with('/') && !pattern.starts_with("**") {
        let anywhere = format!("**/{}", pattern.trim_start_matches("./"));
        builder.add(glob(&anywhere).map_err(invalid)?);
    }
    builder.build().map_err(invalid)
}

fn build_glob_set(patterns: &[String]) -> PipelineResult<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| PipelineError::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| PipelineError::Config(format!("invalid glob set: {}", e)))
}

/// Load engine configuration from a target root.
///
/// Searches for `codemend.toml`, then `.codemendrc.json`. Returns the default
/// configuration if neither exists. A file that exists but does not parse is
/// a configuration error.
pub fn load_engine_config(root: &Path) -> PipelineResult<EngineConfig> {
    let toml_path = root.join("codemend.toml");
    if toml_path.is_file() {
        debug!("Loading engine config from {}", toml_path.display());
        return load_config_file(&toml_path);
    }

    let json_path = root.join(".codemendrc.json");
    if json_path.is_file() {
        debug!("Loading engine config from {}", json_path.display());
        return load_config_file(&json_path);
    }

    debug!("No engine config found, using defaults");
    Ok(EngineConfig::default())
}

/// Load configuration from an explicit TOML or JSON file
pub fn load_config_file(path: &Path) -> PipelineResult<EngineConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::Config(format!("cannot read {}: {}", path.display(), e)))?;

    let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
    let config: EngineConfig = if is_json {
        serde_json::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?
    } else {
        toml::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?
    };
    Ok(config)
}

#[cfg(test)]
mod tests;
