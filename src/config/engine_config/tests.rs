use super::*;
use std::path::PathBuf;

#[test]
fn test_default_config_is_valid() {
    let config = EngineConfig::default();
    assert!(config.validate().is_ok());
    assert!(!config.auto_apply);
    assert_eq!(config.max_depth, 10);
    assert_eq!(config.type_priority_order[0], Category::Security);
}

#[test]
fn test_confidence_out_of_range_is_fatal() {
    let config = EngineConfig {
        confidence_threshold: 1.5,
        ..Default::default()
    };
    assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
}

#[test]
fn test_critical_below_max_complexity_is_rejected() {
    let config = EngineConfig {
        max_complexity: 15,
        critical_complexity: 10,
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_duplicate_priority_entry_is_rejected() {
    let config = EngineConfig {
        type_priority_order: vec![Category::Security, Category::Security],
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_glob_is_rejected() {
    let config = EngineConfig {
        exclude: vec!["[".to_string()],
        ..Default::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_toml_parsing_with_ignore_rules() {
    let toml_str = r#"
max_complexity = 8
critical_complexity = 12
confidence_threshold = 0.8
runtime = "syntax-only"
severity_filter = ["critical", "warning"]

[[ignore]]
code = "CONSOLE_LOG"
path = "scripts/**"
"#;
    let config: EngineConfig = toml::from_str(toml_str).expect("should parse");
    assert_eq!(config.max_complexity, 8);
    assert_eq!(config.runtime, RuntimeMode::SyntaxOnly);
    assert_eq!(config.severity_filter, vec![Severity::Critical, Severity::Minor]);
    assert_eq!(config.ignore.len(), 1);
    // Unspecified fields keep their defaults
    assert_eq!(config.max_depth, 10);
    assert!(config.validate().is_ok());
}

#[test]
fn test_camel_case_aliases() {
    let json = r#"{"maxComplexity": 5, "criticalComplexity": 9, "confidenceThreshold": 0.5, "autoApply": true}"#;
    let config: EngineConfig = serde_json::from_str(json).expect("should parse");
    assert_eq!(config.max_complexity, 5);
    assert!(config.auto_apply);
    assert!((config.confidence_threshold - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_ignore_matcher() {
    let config = EngineConfig {
        ignore: vec![
            IgnoreRule {
                code: Some("CONSOLE_LOG".to_string()),
                path: Some("**/scripts/**".to_string()),
            },
            IgnoreRule::default(),
        ],
        ..Default::default()
    };
    let matchers = config.ignore_matchers().expect("valid globs");
    let script = PathBuf::from("/repo/scripts/build.js");
    let src = PathBuf::from("/repo/src/app.js");
    assert!(matchers[0].matches("CONSOLE_LOG", &script));
    assert!(!matchers[0].matches("CONSOLE_LOG", &src));
    assert!(!matchers[0].matches("EVAL_USAGE", &script));
    assert!(!matchers[1].matches("CONSOLE_LOG", &script));
}

#[test]
fn test_relative_ignore_path_matches_absolute_files() {
    let config = EngineConfig {
        ignore: vec![
            IgnoreRule {
                code: Some("CONSOLE_LOG".to_string()),
                path: Some("scripts/**".to_string()),
            },
            IgnoreRule {
                code: None,
                path: Some("./generated/*.js".to_string()),
            },
        ],
        ..Default::default()
    };
    let matchers = config.ignore_matchers().expect("valid globs");
    assert!(matchers[0].matches("CONSOLE_LOG", Path::new("/repo/scripts/a.js")));
    assert!(matchers[0].matches("CONSOLE_LOG", Path::new("scripts/a.js")));
    assert!(!matchers[0].matches("CONSOLE_LOG", Path::new("/repo/src/a.js")));
    assert!(matchers[1].matches("EVAL_USAGE", Path::new("/repo/generated/api.js")));
    assert!(!matchers[1].matches("EVAL_USAGE", Path::new("/repo/generated/deep/api.js")));
}

#[test]
fn test_load_engine_config_prefers_toml() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    std::fs::write(dir.path().join("codemend.toml"), "max_complexity = 7\ncritical_complexity = 9\n")
        .expect("should write config");
    std::fs::write(dir.path().join(".codemendrc.json"), r#"{"max_complexity": 3}"#)
        .expect("should write config");

    let config = load_engine_config(dir.path()).expect("should load");
    assert_eq!(config.max_complexity, 7);
}

#[test]
fn test_load_engine_config_defaults_and_errors() {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let config = load_engine_config(dir.path()).expect("defaults");
    assert_eq!(config.max_complexity, 10);

    std::fs::write(dir.path().join("codemend.toml"), "max_complexity = \"many\"")
        .expect("should write config");
    assert!(matches!(
        load_engine_config(dir.path()),
        Err(PipelineError::Config(_))
    ));
}
