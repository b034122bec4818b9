//! Error taxonomy for the pipeline
//!
//! Per-file and per-transformation errors are captured and attached to the
//! item they belong to; only [`PipelineError::Config`] stops a run from
//! starting.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("plugin '{plugin}' failed: {message}")]
    Plugin { plugin: String, message: String },

    #[error("stale edit {id} in {path}: expected {expected:?} at {start}..{end}")]
    StaleEdit {
        id: String,
        path: PathBuf,
        start: usize,
        end: usize,
        expected: String,
    },

    #[error("validation timed out after {0}ms")]
    ValidationTimeout(u64),

    #[error("failed to write {path}: {source}")]
    ApplyIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("run cancelled")]
    Cancelled,
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        PipelineError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }
}

/// Render a caught panic payload as a message
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
