use super::*;

fn unit(path: &str, source: &str) -> SourceUnit {
    SourceUnit::parse(PathBuf::from(path), source).expect("should parse")
}

#[test]
fn test_language_from_extension() {
    assert_eq!(Language::from_path(Path::new("a.js")), Some(Language::JavaScript));
    assert_eq!(Language::from_path(Path::new("a.mjs")), Some(Language::JavaScript));
    assert_eq!(Language::from_path(Path::new("a.ts")), Some(Language::TypeScript));
    assert_eq!(Language::from_path(Path::new("a.tsx")), Some(Language::Tsx));
    assert_eq!(Language::from_path(Path::new("a.py")), None);
}

#[test]
fn test_clean_source_has_no_diagnostics() {
    let diags = check_syntax(Language::JavaScript, "const x = JSON.parse(input);\n")
        .expect("parser available");
    assert!(diags.is_empty());
}

#[test]
fn test_missing_paren_is_reported() {
    let diags = check_syntax(Language::JavaScript, "const x = JSON.parse(input;\n")
        .expect("parser available");
    assert!(!diags.is_empty());
    assert_eq!(diags[0].line, 1);
}

#[test]
fn test_broken_file_is_parse_error() {
    let err = SourceUnit::parse("/repo/bad.js", "function (").expect_err("should fail");
    assert!(matches!(err, PipelineError::Parse { .. }));
}

#[test]
fn test_unsupported_extension_is_parse_error() {
    let err = SourceUnit::parse("/repo/readme.md", "# hi").expect_err("should fail");
    assert!(matches!(err, PipelineError::Parse { .. }));
}

#[test]
fn test_typescript_parses() {
    let u = unit("/repo/a.ts", "export function add(a: number, b: number): number { return a + b; }\n");
    assert_eq!(u.language(), Language::TypeScript);
}

#[test]
fn test_line_index_positions() {
    let idx = LineIndex::new("ab\ncd\n\nef");
    assert_eq!(idx.position(0), (1, 1));
    assert_eq!(idx.position(1), (1, 2));
    assert_eq!(idx.position(3), (2, 1));
    assert_eq!(idx.position(7), (4, 1));
    assert_eq!(idx.line_start(2), Some(3));
    assert_eq!(idx.line_start(0), None);
    assert_eq!(idx.line_count(), 4);
}

#[test]
fn test_extract_imports_all_forms() {
    let source = r#"
import a from "./a";
import { b } from '../lib/b.js';
export { c } from "./c";
const d = require("./d");
const lodash = require("lodash");
async function load() { return import("./e"); }
"#;
    let u = unit("/repo/src/main.js", source);
    let specs: Vec<String> = u.imports().into_iter().map(|i| i.specifier).collect();
    assert_eq!(specs, vec!["./a", "../lib/b.js", "./c", "./d", "lodash", "./e"]);

    let relative: Vec<_> = u.imports().into_iter().filter(|i| i.is_relative()).collect();
    assert_eq!(relative.len(), 5);
    assert_eq!(relative[0].line, 2);
}

#[test]
fn test_enclosing_function_declaration() {
    let source = "function outer(a, b) {\n  return eval(a);\n}\n";
    let u = unit("/repo/a.js", source);
    let start = source.find("eval").expect("has eval");
    let span = u
        .enclosing_function(TextRange::new(start, start + 7))
        .expect("inside a function");
    assert_eq!(span.name, "outer");
    assert_eq!(span.params, 2);
    assert_eq!(span.range.start, 0);
}

#[test]
fn test_enclosing_arrow_binding_includes_declaration() {
    let source = "const parse = (s) => eval(s);\n";
    let u = unit("/repo/a.js", source);
    let start = source.find("eval").expect("has eval");
    let span = u
        .enclosing_function(TextRange::new(start, start + 7))
        .expect("inside a function");
    assert_eq!(span.name, "parse");
    assert_eq!(&source[span.range.start..span.range.end], "const parse = (s) => eval(s);");
}

#[test]
fn test_top_level_code_has_no_enclosing_function() {
    let source = "console.log(1);\n";
    let u = unit("/repo/a.js", source);
    assert!(u.enclosing_function(TextRange::new(0, 14)).is_none());
    assert_eq!(u.top_level_statement(TextRange::new(0, 3)), Some(TextRange::new(0, 15)));
}
