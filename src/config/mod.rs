//! Configuration module for codemend
//!
//! This module handles:
//! - Engine options (`codemend.toml` / `.codemendrc.json`)
//! - Validation of thresholds at startup
//! - Compiled exclude and ignore globs

mod engine_config;

pub use engine_config::{
    load_config_file, load_engine_config, EngineConfig, IgnoreMatcher, IgnoreRule, RuntimeMode,
    DEFAULT_EXCLUDE_PATTERNS,
};
