//! codemend - analyze JavaScript/TypeScript sources, propose fixes,
//! validate them and apply the safe ones.
//!
//! The pipeline is driven by [`orchestrator::Orchestrator`]:
//!
//! ```no_run
//! use codemend::config::EngineConfig;
//! use codemend::orchestrator::{Orchestrator, SourceInput};
//!
//! let orchestrator = Orchestrator::new(EngineConfig::default())?;
//! let report = orchestrator.run(vec![SourceInput::new("/repo/a.js", "var x = eval(input);\n")]);
//! println!("{} transformations proposed", report.outcome.transformations_proposed);
//! # Ok::<(), codemend::error::PipelineError>(())
//! ```

pub mod analyzer;
pub mod applier;
pub mod config;
pub mod dependencies;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod parsers;
pub mod transform;
pub mod validation;

pub use error::{PipelineError, PipelineResult};
pub use orchestrator::{Orchestrator, RunReport, SourceInput};
