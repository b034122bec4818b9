//! Learning log sinks
//!
//! The orchestrator appends one entry per applied or rejected
//! transformation. Where the entries end up is the caller's choice.

use crate::models::LearningEntry;
use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Append-only sink for learning entries
pub trait LearningLog: Send + Sync {
    fn append(&self, entries: &[LearningEntry]) -> Result<()>;
}

/// Keeps entries in memory
#[derive(Debug, Default)]
pub struct MemoryLearningLog {
    entries: Mutex<Vec<LearningEntry>>,
}

impl MemoryLearningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LearningEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

impl LearningLog for MemoryLearningLog {
    fn append(&self, entries: &[LearningEntry]) -> Result<()> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("learning log lock poisoned"))?;
        guard.extend_from_slice(entries);
        Ok(())
    }
}

/// Appends one JSON object per line to a file
#[derive(Debug)]
pub struct JsonlLearningLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlLearningLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry back, skipping blank lines
    pub fn read(path: &Path) -> Result<Vec<LearningEntry>> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open learning log {}", path.display()))?;
        let mut entries = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line)
                .with_context(|| format!("Invalid learning entry at {}:{}", path.display(), n + 1))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

impl LearningLog for JsonlLearningLog {
    fn append(&self, entries: &[LearningEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut buf = String::new();
        for entry in entries {
            buf.push_str(&serde_json::to_string(entry)?);
            buf.push('\n');
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open learning log {}", self.path.display()))?;
        file.write_all(buf.as_bytes())
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        Ok(())
    }
}
