//! CLI definition and handler

mod files;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use codemend::config::{load_config_file, load_engine_config, EngineConfig, RuntimeMode};
use codemend::orchestrator::{JsonlLearningLog, Orchestrator};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Parse and validate workers count (1-64)
fn parse_workers(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("workers must be at least 1".to_string())
    } else if n > 64 {
        Err("workers cannot exceed 64".to_string())
    } else {
        Ok(n)
    }
}

/// Parse a confidence threshold (0-1)
fn parse_confidence(s: &str) -> Result<f64, String> {
    let v: f64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err("confidence must be between 0 and 1".to_string())
    }
}

/// codemend - find, validate and apply safe fixes in JavaScript/TypeScript code
#[derive(Parser, Debug)]
#[command(name = "codemend")]
#[command(
    version,
    about = "Analyze JavaScript/TypeScript sources, propose fixes, validate them and apply the safe ones",
    after_help = "\
Examples:
  codemend .                              Dry run over the current directory
  codemend src --apply                    Write validated fixes (keeps .bak copies)
  codemend . --format json -o plan.json   Machine-readable plan
  codemend . --runtime syntax-only        Skip runtime and test validation
  codemend . --fail-on critical           Exit code 1 on critical issues (CI mode)"
)]
pub struct Cli {
    /// File or directory to process
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Write validated fixes to disk (default: dry run)
    #[arg(long)]
    pub apply: bool,

    /// Do not keep a .bak copy of rewritten files
    #[arg(long)]
    pub no_backup: bool,

    /// Config file (default: codemend.toml or .codemendrc.json in PATH)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

    /// Output file path (default: stdout)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Minimum confidence for a fix to be validated (0-1)
    #[arg(long, value_parser = parse_confidence)]
    pub confidence: Option<f64>,

    /// Cyclomatic complexity above which a file is flagged
    #[arg(long)]
    pub max_complexity: Option<u32>,

    /// Number of parallel workers (1-64)
    #[arg(long, value_parser = parse_workers)]
    pub workers: Option<usize>,

    /// Timeout for each validation script, in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// How fixes are executed during validation
    #[arg(long, value_parser = ["auto", "node", "syntax-only"])]
    pub runtime: Option<String>,

    /// Append learning entries (JSON lines) to this file
    #[arg(long, env = "CODEMEND_LEARNING_LOG")]
    pub learning_log: Option<PathBuf>,

    /// Exit with code 1 if any issue at or above this severity is found
    #[arg(long, value_parser = ["critical", "major", "minor", "info"])]
    pub fail_on: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,
}

impl Cli {
    /// Flags override values from the config file
    fn apply_overrides(&self, config: &mut EngineConfig) {
        if self.apply {
            config.auto_apply = true;
        }
        if self.no_backup {
            config.keep_backup = false;
        }
        if let Some(c) = self.confidence {
            config.confidence_threshold = c;
        }
        if let Some(m) = self.max_complexity {
            config.max_complexity = m;
            config.critical_complexity = config.critical_complexity.max(m);
        }
        if let Some(w) = self.workers {
            config.workers = w;
        }
        if let Some(t) = self.timeout_ms {
            config.timeout_ms = t;
        }
        if let Some(runtime) = self.runtime.as_deref() {
            config.runtime = match runtime {
                "node" => RuntimeMode::Node,
                "syntax-only" => RuntimeMode::SyntaxOnly,
                _ => RuntimeMode::Auto,
            };
        }
    }
}

/// Run the pipeline over the path given on the command line
pub fn run(cli: Cli) -> Result<()> {
    let root = files::resolve_root(&cli.path)?;
    let config_root = if root.is_file() {
        root.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| root.clone())
    } else {
        root.clone()
    };

    let mut config = match &cli.config {
        Some(path) => load_config_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => load_engine_config(&config_root)?,
    };
    cli.apply_overrides(&mut config);
    config.validate()?;

    let exclude = config.exclude_set()?;
    let paths = files::collect_source_files(&root, &exclude)?;
    if paths.is_empty() {
        println!("\n{}", style("No source files found.").yellow());
        return Ok(());
    }
    info!("Found {} source files under {}", paths.len(), root.display());
    let inputs = files::read_sources(&paths);

    let mut orchestrator = Orchestrator::new(config)?
        .with_observer(Box::new(|stage| debug!("Stage: {}", stage)));
    if let Some(log) = &cli.learning_log {
        orchestrator = orchestrator.with_learning_log(Arc::new(JsonlLearningLog::new(log)));
    }
    match orchestrator.runtime_name() {
        Some(name) => debug!("Validating with {}", name),
        None => debug!("Validating without a script runtime"),
    }

    let report = orchestrator.run(inputs);
    output::emit(&report, &cli.format, cli.output.as_deref(), &config_root)?;
    output::check_fail_threshold(cli.fail_on.as_deref(), &report);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workers_bounds() {
        assert_eq!(parse_workers("4"), Ok(4));
        assert!(parse_workers("0").is_err());
        assert!(parse_workers("65").is_err());
        assert!(parse_workers("many").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "codemend",
            "src",
            "--apply",
            "--no-backup",
            "--confidence",
            "0.9",
            "--max-complexity",
            "30",
            "--runtime",
            "syntax-only",
        ]);
        let mut config = EngineConfig::default();
        cli.apply_overrides(&mut config);
        assert!(config.auto_apply);
        assert!(!config.keep_backup);
        assert_eq!(config.confidence_threshold, 0.9);
        assert_eq!(config.max_complexity, 30);
        assert_eq!(config.critical_complexity, 30);
        assert_eq!(config.runtime, RuntimeMode::SyntaxOnly);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_confidence_out_of_range_is_refused() {
        assert!(Cli::try_parse_from(["codemend", "--confidence", "1.5"]).is_err());
    }
}
