//! Built-in transformation strategies, one per category
//!
//! Each strategy reads the issues the analyzer attached to a file and uses
//! the syntax tree to build an exact, minimal edit. An issue whose shape
//! does not fit a safe rewrite produces no candidate.

use super::{FileContext, TransformStrategy};
use crate::analyzer::lexical::{ancestor_of_kind, call_at, node_at, parse_loop_header};
use crate::models::{Category, Issue, TextRange, Transformation};
use crate::parsers::FUNCTION_KINDS;
use std::sync::Arc;
use tree_sitter::Node;

/// The built-in strategy of every category
pub fn builtin() -> Vec<Arc<dyn TransformStrategy>> {
    vec![
        Arc::new(SecurityStrategy),
        Arc::new(PerformanceStrategy),
        Arc::new(ComplexityStrategy),
        Arc::new(MaintainabilityStrategy),
    ]
}

fn range_of(node: &Node) -> TextRange {
    TextRange::new(node.start_byte(), node.end_byte())
}

/// Build a candidate tied to `issue`, tagging the enclosing named function
fn propose(
    ctx: &FileContext<'_>,
    issue: &Issue,
    category: Category,
    range: TextRange,
    replacement: impl Into<String>,
    confidence: f64,
    description: impl Into<String>,
) -> Option<Transformation> {
    let unit = ctx.unit;
    let symbol = unit.enclosing_function(range).map(|f| f.name);
    Transformation::replace(
        unit.path().to_path_buf(),
        unit.text(),
        range.start,
        range.end,
        replacement,
        category,
        issue.severity,
        confidence,
        description,
    )
    .map(|t| t.with_issue(issue.id.clone()).with_symbol(symbol))
}

/// The only argument of a call, unless it is a spread
fn single_argument<'t>(call: &Node<'t>) -> Option<Node<'t>> {
    let args = call.child_by_field_name("arguments")?;
    if args.named_child_count() != 1 {
        return None;
    }
    let arg = args.named_child(0)?;
    (arg.kind() != "spread_element").then_some(arg)
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Offsets of `word` in `text` at identifier boundaries
fn word_offsets(text: &str, word: &str) -> Vec<usize> {
    let bytes = text.as_bytes();
    text.match_indices(word)
        .map(|(i, _)| i)
        .filter(|&i| {
            let before = i == 0 || !is_ident_byte(bytes[i - 1]);
            let end = i + word.len();
            let after = end >= bytes.len() || !is_ident_byte(bytes[end]);
            before && after
        })
        .collect()
}

/// Extend a statement range to its whole line when nothing else shares the line
fn removal_range(text: &str, range: TextRange) -> TextRange {
    let line_start = text[..range.start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = text[range.end..]
        .find('\n')
        .map(|i| range.end + i)
        .unwrap_or(text.len());
    let alone = text[line_start..range.start].trim().is_empty()
        && text[range.end..line_end].trim().is_empty();
    if !alone {
        return range;
    }
    let end = if line_end < text.len() { line_end + 1 } else { line_end };
    TextRange::new(line_start, end)
}

/// Statements directly inside a block or the program can be removed safely
fn in_statement_list(stmt: &Node) -> bool {
    stmt.parent()
        .map(|p| matches!(p.kind(), "statement_block" | "program"))
        .unwrap_or(false)
}

/// eval, string timers, innerHTML
pub struct SecurityStrategy;

impl TransformStrategy for SecurityStrategy {
    fn name(&self) -> &'static str {
        "security"
    }

    fn category(&self) -> Category {
        Category::Security
    }

    fn analyze(&self, ctx: &FileContext<'_>) -> anyhow::Result<Vec<Transformation>> {
        let unit = ctx.unit;
        let root = unit.root();
        let mut out = Vec::new();

        for issue in ctx.issues_with_code("EVAL_USAGE") {
            let Some(range) = issue.location.range else { continue };
            let Some(call) = call_at(&root, range.start) else { continue };
            let Some(arg) = single_argument(&call) else { continue };
            let replacement = format!("JSON.parse({})", unit.node_text(&arg));
            out.extend(propose(
                ctx,
                issue,
                Category::Security,
                range_of(&call),
                replacement,
                0.8,
                "Replace eval() with JSON.parse()",
            ));
        }

        for issue in ctx.issues_with_code("STRING_TIMER") {
            let Some(range) = issue.location.range else { continue };
            let Some(call) = call_at(&root, range.start) else { continue };
            let Some(first) = call
                .child_by_field_name("arguments")
                .and_then(|a| a.named_child(0))
            else {
                continue;
            };
            let Some(code) = plain_string_contents(unit.node_text(&first), &first) else {
                continue;
            };
            out.extend(propose(
                ctx,
                issue,
                Category::Security,
                range_of(&first),
                format!("() => {{ {} }}", code.trim()),
                0.85,
                "Pass a callback instead of a code string",
            ));
        }

        for issue in ctx.issues_with_code("INNER_HTML") {
            let Some(range) = issue.location.range else { continue };
            out.extend(propose(
                ctx,
                issue,
                Category::Security,
                range,
                "textContent",
                0.75,
                "Assign text with textContent instead of innerHTML",
            ));
        }

        Ok(out)
    }
}

/// Contents of a string literal without escapes or interpolation
fn plain_string_contents<'s>(text: &'s str, node: &Node) -> Option<&'s str> {
    match node.kind() {
        "string" => {}
        "template_string" if node.named_child_count() == 0 => {}
        _ => return None,
    }
    let inner = text.get(1..text.len().checked_sub(1)?)?;
    if inner.trim().is_empty() || inner.contains('\\') || inner.contains('\n') {
        return None;
    }
    Some(inner)
}

/// JSON deep clones, loop length lookups
pub struct PerformanceStrategy;

impl TransformStrategy for PerformanceStrategy {
    fn name(&self) -> &'static str {
        "performance"
    }

    fn category(&self) -> Category {
        Category::Performance
    }

    fn analyze(&self, ctx: &FileContext<'_>) -> anyhow::Result<Vec<Transformation>> {
        let unit = ctx.unit;
        let text = unit.text();
        let root = unit.root();
        let mut out = Vec::new();

        for issue in ctx.issues_with_code("DEEP_CLONE_JSON") {
            let Some(range) = issue.location.range else { continue };
            let Some(outer) = call_at(&root, range.start) else { continue };
            let Some(inner) = single_argument(&outer).filter(|n| n.kind() == "call_expression")
            else {
                continue;
            };
            let is_stringify = inner
                .child_by_field_name("function")
                .map(|f| unit.node_text(&f) == "JSON.stringify")
                .unwrap_or(false);
            if !is_stringify {
                continue;
            }
            let Some(value) = single_argument(&inner) else { continue };
            out.extend(propose(
                ctx,
                issue,
                Category::Performance,
                range_of(&outer),
                format!("structuredClone({})", unit.node_text(&value)),
                0.85,
                "Deep clone with structuredClone()",
            ));
        }

        for issue in ctx.issues_with_code("LOOP_LENGTH_LOOKUP") {
            let Some(range) = issue.location.range else { continue };
            let Some(header) = parse_loop_header(text, range.start) else { continue };
            let Some(body) = node_at(&root, range.start)
                .and_then(|n| n.parent())
                .filter(|n| n.kind() == "for_statement")
                .and_then(|n| n.child_by_field_name("body"))
            else {
                continue;
            };
            if mutates_collection(unit.node_text(&body), &header.collection) {
                continue;
            }
            let Some(len) = fresh_name(text, &["len", "length_", "cachedLength"]) else {
                continue;
            };
            let replacement = format!(
                "for ({} {} = {}, {len} = {}.length; {} < {len};",
                header.keyword, header.index, header.init, header.collection, header.index
            );
            out.extend(propose(
                ctx,
                issue,
                Category::Performance,
                header.head,
                replacement,
                0.8,
                format!("Cache {}.length before the loop", header.collection),
            ));
        }

        Ok(out)
    }
}

fn mutates_collection(body: &str, collection: &str) -> bool {
    const MUTATORS: &[&str] = &[".push(", ".pop(", ".splice(", ".shift(", ".unshift(", ".length ="];
    MUTATORS
        .iter()
        .any(|m| body.contains(&format!("{collection}{m}")))
        || body.contains(&format!("{collection} = "))
}

fn fresh_name(text: &str, candidates: &[&'static str]) -> Option<&'static str> {
    candidates
        .iter()
        .copied()
        .find(|name| word_offsets(text, name).is_empty())
}

/// Boolean-returning conditionals in files flagged as too complex
pub struct ComplexityStrategy;

impl TransformStrategy for ComplexityStrategy {
    fn name(&self) -> &'static str {
        "complexity"
    }

    fn category(&self) -> Category {
        Category::Complexity
    }

    fn analyze(&self, ctx: &FileContext<'_>) -> anyhow::Result<Vec<Transformation>> {
        let Some(issue) = ctx.issues_with_code("COMPLEXITY").next() else {
            return Ok(Vec::new());
        };
        let unit = ctx.unit;
        let mut out = Vec::new();
        let mut stack = vec![unit.root()];

        while let Some(node) = stack.pop() {
            let rewrite = match node.kind() {
                "if_statement" => boolean_if(unit.text(), &node),
                "ternary_expression" => boolean_ternary(unit.text(), &node),
                _ => None,
            };
            if let Some((replacement, description)) = rewrite {
                out.extend(propose(
                    ctx,
                    issue,
                    Category::Complexity,
                    range_of(&node),
                    replacement,
                    0.9,
                    description,
                ));
            }
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }

        out.sort_by_key(|t| t.original.start);
        Ok(out)
    }
}

/// `true`/`false` returned by a lone `return` (optionally wrapped in a block)
fn returned_bool(node: &Node) -> Option<bool> {
    match node.kind() {
        "statement_block" | "else_clause" if node.named_child_count() == 1 => {
            returned_bool(&node.named_child(0)?)
        }
        "return_statement" if node.named_child_count() == 1 => match node.named_child(0)?.kind() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn literal_bool(node: &Node) -> Option<bool> {
    match node.kind() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn condition_text<'s>(text: &'s str, node: &Node) -> Option<&'s str> {
    let cond = node.child_by_field_name("condition")?;
    let inner = if cond.kind() == "parenthesized_expression" {
        cond.named_child(0)?
    } else {
        cond
    };
    text.get(inner.start_byte()..inner.end_byte())
}

fn boolean_if(text: &str, node: &Node) -> Option<(String, &'static str)> {
    let consequence = returned_bool(&node.child_by_field_name("consequence")?)?;
    let alternative = returned_bool(&node.child_by_field_name("alternative")?)?;
    let cond = condition_text(text, node)?;
    match (consequence, alternative) {
        (true, false) => Some((
            format!("return Boolean({cond});"),
            "Return the condition instead of branching on it",
        )),
        (false, true) => Some((
            format!("return !({cond});"),
            "Return the negated condition instead of branching on it",
        )),
        _ => None,
    }
}

fn boolean_ternary(text: &str, node: &Node) -> Option<(String, &'static str)> {
    let consequence = literal_bool(&node.child_by_field_name("consequence")?)?;
    let alternative = literal_bool(&node.child_by_field_name("alternative")?)?;
    let cond = condition_text(text, node)?;
    match (consequence, alternative) {
        (true, false) => Some((format!("Boolean({cond})"), "Replace cond ? true : false with Boolean(cond)")),
        (false, true) => Some((format!("!({cond})"), "Replace cond ? false : true with !(cond)")),
        _ => None,
    }
}

/// console calls, debugger, var, loose equality
pub struct MaintainabilityStrategy;

impl TransformStrategy for MaintainabilityStrategy {
    fn name(&self) -> &'static str {
        "maintainability"
    }

    fn category(&self) -> Category {
        Category::Maintainability
    }

    fn analyze(&self, ctx: &FileContext<'_>) -> anyhow::Result<Vec<Transformation>> {
        let unit = ctx.unit;
        let text = unit.text();
        let root = unit.root();
        let mut out = Vec::new();

        for issue in ctx.issues_with_code("CONSOLE_LOG") {
            let Some(range) = issue.location.range else { continue };
            let Some(call) = call_at(&root, range.start) else { continue };
            let Some(stmt) = call.parent().filter(|p| {
                p.kind() == "expression_statement"
                    && p.named_child(0).map(|c| c.id()) == Some(call.id())
            }) else {
                continue;
            };
            if !in_statement_list(&stmt) {
                continue;
            }
            out.extend(propose(
                ctx,
                issue,
                Category::Maintainability,
                removal_range(text, range_of(&stmt)),
                "",
                0.9,
                "Remove console call",
            ));
        }

        for issue in ctx.issues_with_code("DEBUGGER_STATEMENT") {
            let Some(range) = issue.location.range else { continue };
            let Some(stmt) = ancestor_of_kind(&root, range.start, "debugger_statement") else {
                continue;
            };
            if !in_statement_list(&stmt) {
                continue;
            }
            out.extend(propose(
                ctx,
                issue,
                Category::Maintainability,
                removal_range(text, range_of(&stmt)),
                "",
                0.95,
                "Remove debugger statement",
            ));
        }

        for issue in ctx.issues_with_code("VAR_DECLARATION") {
            let Some(range) = issue.location.range else { continue };
            let Some(decl) = node_at(&root, range.start)
                .and_then(|n| n.parent())
                .filter(|n| n.kind() == "variable_declaration")
            else {
                continue;
            };
            if !var_to_let_is_safe(text, &decl) {
                continue;
            }
            out.extend(propose(
                ctx,
                issue,
                Category::Maintainability,
                range,
                "let",
                0.8,
                "Declare with let instead of var",
            ));
        }

        for issue in ctx.issues_with_code("LOOSE_EQUALITY") {
            let Some(range) = issue.location.range else { continue };
            let Some(binary) = node_at(&root, range.start)
                .and_then(|n| n.parent())
                .filter(|n| n.kind() == "binary_expression")
            else {
                continue;
            };
            let (Some(left), Some(right)) = (
                binary.child_by_field_name("left"),
                binary.child_by_field_name("right"),
            ) else {
                continue;
            };
            let is_nullish = |n: &Node| {
                n.kind() == "null" || n.kind() == "undefined" || unit.node_text(n) == "undefined"
            };
            if is_nullish(&left) || is_nullish(&right) {
                continue;
            }
            let is_typeof = |n: &Node| {
                n.kind() == "unary_expression"
                    && n.child_by_field_name("operator").map(|o| o.kind()) == Some("typeof")
            };
            let confidence = if is_typeof(&left) || is_typeof(&right) {
                0.95
            } else {
                0.8
            };
            let op = &text[range.start..range.end];
            let strict = if op == "!=" { "!==" } else { "===" };
            out.extend(propose(
                ctx,
                issue,
                Category::Maintainability,
                range,
                strict,
                confidence,
                format!("Use strict equality {strict}"),
            ));
        }

        Ok(out)
    }
}

/// `var` ⇒ `let` keeps meaning when the declaration sits at the top of a
/// function body or the program, every name is a plain identifier declared
/// only once with `var`, and no name is used before its declaration.
fn var_to_let_is_safe(text: &str, decl: &Node) -> bool {
    let Some(scope) = decl.parent() else {
        return false;
    };
    let top_of_function = scope.kind() == "statement_block"
        && scope
            .parent()
            .map(|p| FUNCTION_KINDS.contains(&p.kind()))
            .unwrap_or(false);
    if scope.kind() != "program" && !top_of_function {
        return false;
    }

    let mut cursor = decl.walk();
    let declarators: Vec<Node> = decl.named_children(&mut cursor).collect();
    if declarators.is_empty() {
        return false;
    }

    let scope_text = &text[scope.start_byte()..scope.end_byte()];
    for declarator in declarators {
        if declarator.kind() != "variable_declarator" {
            return false;
        }
        let Some(name) = declarator
            .child_by_field_name("name")
            .filter(|n| n.kind() == "identifier")
            .and_then(|n| text.get(n.start_byte()..n.end_byte()))
        else {
            return false;
        };

        let redeclared = word_offsets(text, name)
            .into_iter()
            .filter(|&i| text[..i].trim_end().ends_with("var"))
            .count()
            > 1;
        if redeclared {
            return false;
        }

        let first_use = word_offsets(scope_text, name)
            .first()
            .map(|i| scope.start_byte() + i);
        if first_use.map(|i| i < decl.start_byte()).unwrap_or(false) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::IssueDetector;
    use crate::config::EngineConfig;
    use crate::parsers::SourceUnit;

    fn run(strategy: &dyn TransformStrategy, path: &str, source: &str) -> (SourceUnit, Vec<Transformation>) {
        run_with(strategy, path, source, EngineConfig::default())
    }

    fn run_with(
        strategy: &dyn TransformStrategy,
        path: &str,
        source: &str,
        config: EngineConfig,
    ) -> (SourceUnit, Vec<Transformation>) {
        let unit = SourceUnit::parse(path, source).expect("should parse");
        let detector = IssueDetector::new(Arc::new(config)).expect("valid config");
        let analysis = detector.analyze(&unit, None).result;
        let ctx = FileContext::new(&unit, &analysis.issues, &analysis.metrics);
        let candidates = strategy.analyze(&ctx).expect("strategy runs");
        (unit, candidates)
    }

    fn applied(source: &str, t: &Transformation) -> String {
        t.apply_to(source).expect("in bounds")
    }

    #[test]
    fn test_eval_becomes_json_parse() {
        let source = "function load(input) {\n  return eval(input);\n}\n";
        let (_, ts) = run(&SecurityStrategy, "/repo/a.js", source);
        assert_eq!(ts.len(), 1);
        assert_eq!(ts[0].original.text, "eval(input)");
        assert_eq!(ts[0].replacement, "JSON.parse(input)");
        assert_eq!(ts[0].symbol.as_deref(), Some("load"));
        assert!(ts[0].issue_id.is_some());
    }

    #[test]
    fn test_string_timer_becomes_callback() {
        let source = "setTimeout(\"tick()\", 100);\n";
        let (_, ts) = run(&SecurityStrategy, "/repo/a.js", source);
        assert_eq!(ts.len(), 1);
        assert_eq!(applied(source, &ts[0]), "setTimeout(() => { tick() }, 100);\n");
    }

    #[test]
    fn test_inner_html_becomes_text_content() {
        let source = "el.innerHTML = msg;\n";
        let (_, ts) = run(&SecurityStrategy, "/repo/a.js", source);
        assert_eq!(applied(source, &ts[0]), "el.textContent = msg;\n");
    }

    #[test]
    fn test_deep_clone_becomes_structured_clone() {
        let source = "const copy = JSON.parse(JSON.stringify(state));\n";
        let (_, ts) = run(&PerformanceStrategy, "/repo/a.js", source);
        assert_eq!(ts.len(), 1);
        assert_eq!(applied(source, &ts[0]), "const copy = structuredClone(state);\n");
    }

    #[test]
    fn test_loop_length_is_cached() {
        let source = "function sum(xs) {\n  let t = 0;\n  for (let i = 0; i < xs.length; i++) { t += xs[i]; }\n  return t;\n}\n";
        let (_, ts) = run(&PerformanceStrategy, "/repo/a.js", source);
        assert_eq!(ts.len(), 1);
        assert!(applied(source, &ts[0]).contains("for (let i = 0, len = xs.length; i < len; i++)"));
    }

    #[test]
    fn test_loop_that_mutates_collection_is_left_alone() {
        let source = "for (let i = 0; i < xs.length; i++) { xs.pop(); }\n";
        let (_, ts) = run(&PerformanceStrategy, "/repo/a.js", source);
        assert!(ts.is_empty());
    }

    #[test]
    fn test_complexity_rewrites_only_when_flagged() {
        let source = "function ok(a) {\n  if (a > 1) { return true; } else { return false; }\n}\nconst b = ok(2) ? true : false;\n";
        let (_, none) = run(&ComplexityStrategy, "/repo/a.js", source);
        assert!(none.is_empty());

        let config = EngineConfig {
            max_complexity: 1,
            critical_complexity: 2,
            ..Default::default()
        };
        let (_, ts) = run_with(&ComplexityStrategy, "/repo/a.js", source, config);
        assert_eq!(ts.len(), 2);
        assert_eq!(ts[0].replacement, "return Boolean(a > 1);");
        assert_eq!(ts[1].replacement, "Boolean(ok(2))");
    }

    #[test]
    fn test_console_and_debugger_lines_removed() {
        let source = "function f(x) {\n  console.log(x);\n  debugger;\n  return x;\n}\n";
        let (_, ts) = run(&MaintainabilityStrategy, "/repo/a.js", source);
        assert_eq!(ts.len(), 2);
        let mut text = source.to_string();
        let mut sorted = ts.clone();
        sorted.sort_by_key(|t| std::cmp::Reverse(t.original.start));
        for t in &sorted {
            text = applied(&text, t);
        }
        assert_eq!(text, "function f(x) {\n  return x;\n}\n");
    }

    #[test]
    fn test_console_in_braceless_if_is_kept() {
        let source = "if (x) console.log(x);\n";
        let (_, ts) = run(&MaintainabilityStrategy, "/repo/a.js", source);
        assert!(ts.iter().all(|t| !t.description.contains("console")));
    }

    #[test]
    fn test_var_and_loose_equality() {
        let source = "var count = 1;\nif (count == 1) { count = 2; }\nif (count != null) { count = 3; }\n";
        let (_, ts) = run(&MaintainabilityStrategy, "/repo/a.js", source);
        let replacements: Vec<&str> = ts.iter().map(|t| t.replacement.as_str()).collect();
        assert_eq!(replacements, vec!["let", "==="]);
    }

    #[test]
    fn test_var_used_before_declaration_is_kept() {
        let source = "function f() {\n  x = 2;\n  var x = 1;\n  return x;\n}\n";
        let (_, ts) = run(&MaintainabilityStrategy, "/repo/a.js", source);
        assert!(ts.iter().all(|t| t.replacement != "let"));
    }

    #[test]
    fn test_removal_range_keeps_shared_lines() {
        let text = "a(); console.log(1);\n";
        let r = removal_range(text, TextRange::new(5, 20));
        assert_eq!(r, TextRange::new(5, 20));
        let text = "  debugger;\nnext();\n";
        assert_eq!(removal_range(text, TextRange::new(2, 11)), TextRange::new(0, 12));
    }
}
