//! Source file discovery

use anyhow::{Context, Result};
use codemend::orchestrator::SourceInput;
use codemend::parsers::supported_extensions;
use globset::GlobSet;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| supported_extensions().contains(&ext))
        .unwrap_or(false)
}

/// Collect supported source files under `root`, respecting .gitignore and
/// `.codemendignore`, minus anything matching `exclude`
pub(super) fn collect_source_files(root: &Path, exclude: &GlobSet) -> Result<Vec<PathBuf>> {
    if root.is_file() {
        if !is_supported(root) {
            anyhow::bail!("Unsupported file type: {}", root.display());
        }
        return Ok(vec![root.to_path_buf()]);
    }

    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .add_custom_ignore_filename(".codemendignore");

    let mut files = Vec::new();
    for entry in builder.build().flatten() {
        let path = entry.path();
        if !path.is_file() || !is_supported(path) {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude.is_match(path) || exclude.is_match(relative) {
            debug!("Excluded {}", path.display());
            continue;
        }
        files.push(path.to_path_buf());
    }
    files.sort();
    Ok(files)
}

/// Read every file; unreadable or non-UTF-8 files are skipped with a warning
pub(super) fn read_sources(files: &[PathBuf]) -> Vec<SourceInput> {
    files
        .iter()
        .filter_map(|path| match SourceInput::read(path) {
            Ok(input) => Some(input),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}

/// Resolve the path argument to an absolute path
pub(super) fn resolve_root(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))
}
