//! Transformation application
//!
//! Edits for one file are spliced in descending start offset, so offsets of
//! edits still to be applied stay valid. Each edit re-verifies its original
//! text first; a mismatch rejects that edit only. A file is locked for its
//! whole read-splice-write sequence, the combined result must parse, and the
//! write goes through a temp file in the same directory followed by a rename.

use crate::error::{PipelineError, PipelineResult};
use crate::models::{ApprovedTransformation, Transformation};
use crate::parsers::{check_syntax, Language};
use dashmap::DashMap;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Why an edit was not applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The file no longer holds the original text at the range
    Stale,
    /// The edit overlaps another edit for the same file
    Conflict,
    /// The combination of edits does not parse
    Syntax,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedEdit {
    pub transformation_id: String,
    pub reason: RejectReason,
    pub message: String,
}

/// Result of splicing edits into a text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Splice {
    pub text: String,
    pub applied: Vec<String>,
    pub rejected: Vec<RejectedEdit>,
}

/// Splice `edits` into `text` in descending start order.
///
/// An edit overlapping one already applied is a conflict; an edit whose
/// range no longer holds its original text is stale. Neither stops the rest.
pub fn splice(text: &str, edits: &[&Transformation]) -> Splice {
    let mut ordered: Vec<&Transformation> = edits.to_vec();
    ordered.sort_by(|a, b| b.original.start.cmp(&a.original.start).then(b.original.end.cmp(&a.original.end)));

    let mut out = Splice {
        text: text.to_string(),
        ..Default::default()
    };
    // Start of the lowest edit applied so far; text before it is untouched
    let mut floor = usize::MAX;

    for t in ordered {
        if t.original.end > floor {
            out.rejected.push(RejectedEdit {
                transformation_id: t.id.clone(),
                reason: RejectReason::Conflict,
                message: format!(
                    "range {}..{} overlaps another edit",
                    t.original.start, t.original.end
                ),
            });
            continue;
        }
        if t.original.start >= t.original.end || !t.matches(&out.text) {
            let err = PipelineError::StaleEdit {
                id: t.id.clone(),
                path: t.file_path.clone(),
                start: t.original.start,
                end: t.original.end,
                expected: t.original.text.clone(),
            };
            out.rejected.push(RejectedEdit {
                transformation_id: t.id.clone(),
                reason: RejectReason::Stale,
                message: err.to_string(),
            });
            continue;
        }
        out.text
            .replace_range(t.original.start..t.original.end, &t.replacement);
        out.applied.push(t.id.clone());
        floor = t.original.start;
    }
    out
}

/// What happened to one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileApplyReport {
    pub path: PathBuf,
    pub applied: Vec<String>,
    pub rejected: Vec<RejectedEdit>,
    pub written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,
}

pub struct Applier {
    keep_backup: bool,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl Applier {
    pub fn new(keep_backup: bool) -> Self {
        Self {
            keep_backup,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        self.locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Apply approved edits to one file
    pub fn apply_file(&self, path: &Path, edits: &[ApprovedTransformation]) -> PipelineResult<FileApplyReport> {
        let lock = self.lock_for(path);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let io_err = |source: std::io::Error| PipelineError::ApplyIo {
            path: path.to_path_buf(),
            source,
        };

        let original = fs::read_to_string(path).map_err(io_err)?;
        let refs: Vec<&Transformation> = edits
            .iter()
            .map(|a| a.transformation())
            .filter(|t| t.file_path == path)
            .collect();
        let result = splice(&original, &refs);

        let mut report = FileApplyReport {
            path: path.to_path_buf(),
            applied: result.applied,
            rejected: result.rejected,
            written: false,
            backup: None,
        };
        for r in &report.rejected {
            warn!("Edit {} not applied to {}: {}", r.transformation_id, path.display(), r.message);
        }
        if report.applied.is_empty() {
            return Ok(report);
        }

        if let Some(language) = Language::from_path(path) {
            let diagnostics = check_syntax(language, &result.text)?;
            if let Some(first) = diagnostics.first() {
                warn!("Combined edits for {} do not parse ({}); file left untouched", path.display(), first);
                let message = format!("combined edits do not parse: {}", first);
                report.rejected.extend(report.applied.drain(..).map(|id| RejectedEdit {
                    transformation_id: id,
                    reason: RejectReason::Syntax,
                    message: message.clone(),
                }));
                return Ok(report);
            }
        }

        if self.keep_backup {
            let backup = backup_path(path);
            fs::write(&backup, &original).map_err(io_err)?;
            report.backup = Some(backup);
        }
        write_atomic(path, &result.text).map_err(io_err)?;
        report.written = true;

        info!("Applied {} edits to {}", report.applied.len(), path.display());
        Ok(report)
    }

    /// Apply edits grouped by file, files in parallel
    pub fn apply_all(&self, edits: Vec<ApprovedTransformation>) -> Vec<(PathBuf, PipelineResult<FileApplyReport>)> {
        let mut by_file: BTreeMap<PathBuf, Vec<ApprovedTransformation>> = BTreeMap::new();
        for edit in edits {
            by_file.entry(edit.file_path.clone()).or_default().push(edit);
        }
        debug!("Applying edits to {} files", by_file.len());

        by_file
            .into_par_iter()
            .map(|(path, edits)| {
                let result = self.apply_file(&path, &edits);
                (path, result)
            })
            .collect()
    }
}

/// `<file>.bak` next to the file
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

/// Write through a temp file in the same directory, then rename over `path`
fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    if let Ok(meta) = fs::metadata(path) {
        let _ = tmp.as_file().set_permissions(meta.permissions());
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
