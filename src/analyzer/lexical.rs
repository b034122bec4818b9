//! Lexical heuristics
//!
//! Each rule is a regex that locates a candidate. The syntax tree then
//! confirms the candidate sits in code (not in a comment or string) and
//! gives the exact span the issue covers.

use crate::models::{Category, Severity, TextRange};
use crate::parsers::SourceUnit;
use regex::Regex;
use std::sync::OnceLock;
use tree_sitter::Node;

/// Inline marker suppressing issues on its own line and the next one.
/// `codemend-ignore` alone suppresses every rule, `codemend-ignore: A, B` only the listed codes.
pub const SUPPRESS_MARKER: &str = "codemend-ignore";

/// A rule match with its final span
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    pub code: &'static str,
    pub category: Category,
    pub severity: Severity,
    pub range: TextRange,
    pub message: String,
    pub suggestion: &'static str,
}

struct Patterns {
    eval: Regex,
    new_function: Regex,
    string_timer: Regex,
    inner_html: Regex,
    deep_clone: Regex,
    for_loop: Regex,
    loop_header: Regex,
    console: Regex,
    debugger: Regex,
    var: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| Patterns {
        eval: Regex::new(r"\beval\s*\(").expect("valid regex"),
        new_function: Regex::new(r"\bnew\s+Function\s*\(").expect("valid regex"),
        string_timer: Regex::new(r#"\b(setTimeout|setInterval)\s*\(\s*["'`]"#).expect("valid regex"),
        inner_html: Regex::new(r"\.(innerHTML)\s*=[^=]").expect("valid regex"),
        deep_clone: Regex::new(r"\bJSON\.parse\(\s*JSON\.stringify\(").expect("valid regex"),
        for_loop: Regex::new(r"\bfor\s*\(").expect("valid regex"),
        loop_header: Regex::new(
            r"^for\s*\(\s*(let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*([^;,]+);\s*([A-Za-z_$][\w$]*)\s*<\s*([A-Za-z_$][\w$.]*)\.length\s*;",
        )
        .expect("valid regex"),
        console: Regex::new(r"\bconsole\.(log|debug|info|trace)\s*\(").expect("valid regex"),
        debugger: Regex::new(r"\bdebugger\b").expect("valid regex"),
        var: Regex::new(r"\bvar\b").expect("valid regex"),
    })
}

/// Header of a `for` loop that re-reads `.length` on every iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopHeader {
    /// `let` or `var`
    pub keyword: String,
    pub index: String,
    pub init: String,
    pub collection: String,
    /// `for (` up to and including the `;` that ends the condition
    pub head: TextRange,
}

/// Parse a `for` loop header of the form `for (let i = 0; i < xs.length; ...)`
pub fn parse_loop_header(text: &str, for_start: usize) -> Option<LoopHeader> {
    let caps = patterns().loop_header.captures(text.get(for_start..)?)?;
    let index = caps.get(2)?.as_str();
    if caps.get(4)?.as_str() != index {
        return None;
    }
    let whole = caps.get(0)?;
    Some(LoopHeader {
        keyword: caps.get(1)?.as_str().to_string(),
        index: index.to_string(),
        init: caps.get(3)?.as_str().trim().to_string(),
        collection: caps.get(5)?.as_str().to_string(),
        head: TextRange::new(for_start, for_start + whole.end()),
    })
}

/// Run every lexical rule over a parsed file
pub fn scan(unit: &SourceUnit) -> Vec<LexicalHit> {
    let p = patterns();
    let text = unit.text();
    let root = unit.root();
    let mut hits = Vec::new();

    for m in p.eval.find_iter(text) {
        if preceded_by_dot(text, m.start()) {
            continue;
        }
        if let Some(call) = call_at(&root, m.start()) {
            hits.push(hit(
                "EVAL_USAGE",
                Category::Security,
                Severity::Critical,
                range_of(&call),
                "eval() executes arbitrary code",
                "Parse data with JSON.parse() instead of evaluating it",
            ));
        }
    }

    for m in p.new_function.find_iter(text) {
        if let Some(call) = call_at(&root, m.start()) {
            hits.push(hit(
                "NEW_FUNCTION",
                Category::Security,
                Severity::Critical,
                range_of(&call),
                "new Function() compiles code from strings",
                "Define the function statically",
            ));
        }
    }

    for caps in p.string_timer.captures_iter(text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if let Some(call) = call_at(&root, whole.start()) {
            hits.push(hit(
                "STRING_TIMER",
                Category::Security,
                Severity::Major,
                range_of(&call),
                format!("{}() with a string argument evaluates code", name.as_str()),
                "Pass a function instead of a string",
            ));
        }
    }

    for caps in p.inner_html.captures_iter(text) {
        let Some(prop) = caps.get(1) else { continue };
        let is_property = node_at(&root, prop.start())
            .map(|n| n.kind() == "property_identifier")
            .unwrap_or(false);
        if is_property {
            hits.push(hit(
                "INNER_HTML",
                Category::Security,
                Severity::Major,
                TextRange::new(prop.start(), prop.end()),
                "assigning to innerHTML can inject markup",
                "Assign to textContent for plain text",
            ));
        }
    }

    for m in p.deep_clone.find_iter(text) {
        if let Some(call) = call_at(&root, m.start()) {
            hits.push(hit(
                "DEEP_CLONE_JSON",
                Category::Performance,
                Severity::Minor,
                range_of(&call),
                "deep clone through JSON serialization",
                "Use structuredClone()",
            ));
        }
    }

    for m in p.for_loop.find_iter(text) {
        let is_for = node_at(&root, m.start())
            .and_then(|n| n.parent())
            .map(|n| n.kind() == "for_statement" && n.start_byte() == m.start())
            .unwrap_or(false);
        if !is_for {
            continue;
        }
        if let Some(header) = parse_loop_header(text, m.start()) {
            let message = format!(
                "loop re-reads {}.length on every iteration",
                header.collection
            );
            hits.push(hit(
                "LOOP_LENGTH_LOOKUP",
                Category::Performance,
                Severity::Minor,
                header.head,
                message,
                "Cache the length in the loop initializer",
            ));
        }
    }

    for caps in p.console.captures_iter(text) {
        let (Some(whole), Some(method)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if let Some(call) = call_at(&root, whole.start()) {
            hits.push(hit(
                "CONSOLE_LOG",
                Category::Maintainability,
                Severity::Info,
                range_of(&call),
                format!("console.{}() left in code", method.as_str()),
                "Remove the console call or use a logger",
            ));
        }
    }

    for m in p.debugger.find_iter(text) {
        if let Some(stmt) = ancestor_of_kind(&root, m.start(), "debugger_statement") {
            hits.push(hit(
                "DEBUGGER_STATEMENT",
                Category::Maintainability,
                Severity::Minor,
                range_of(&stmt),
                "debugger statement left in code",
                "Remove the debugger statement",
            ));
        }
    }

    for m in p.var.find_iter(text) {
        let is_keyword = node_at(&root, m.start())
            .filter(|n| n.kind() == "var")
            .and_then(|n| n.parent())
            .map(|n| n.kind() == "variable_declaration")
            .unwrap_or(false);
        if is_keyword {
            hits.push(hit(
                "VAR_DECLARATION",
                Category::Maintainability,
                Severity::Minor,
                TextRange::new(m.start(), m.end()),
                "var declaration is function scoped",
                "Use let or const",
            ));
        }
    }

    for op in loose_operators(&root) {
        let symbol = op.kind();
        hits.push(hit(
            "LOOSE_EQUALITY",
            Category::Maintainability,
            Severity::Minor,
            range_of(&op),
            format!("loose equality operator {}", symbol),
            "Use strict equality (=== / !==)",
        ));
    }

    hits.retain(|h| !is_suppressed(text, h.range.start, h.code));
    hits.sort_by_key(|h| h.range.start);
    hits
}

fn hit(
    code: &'static str,
    category: Category,
    severity: Severity,
    range: TextRange,
    message: impl Into<String>,
    suggestion: &'static str,
) -> LexicalHit {
    LexicalHit {
        code,
        category,
        severity,
        range,
        message: message.into(),
        suggestion,
    }
}

/// `==` and `!=` operator tokens of every binary expression
fn loose_operators<'t>(root: &Node<'t>) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    let mut stack = vec![*root];
    while let Some(node) = stack.pop() {
        if node.kind() == "binary_expression" {
            if let Some(op) = node
                .child_by_field_name("operator")
                .filter(|op| matches!(op.kind(), "==" | "!="))
            {
                out.push(op);
            }
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }
    out
}

fn range_of(node: &Node) -> TextRange {
    TextRange::new(node.start_byte(), node.end_byte())
}

fn preceded_by_dot(text: &str, offset: usize) -> bool {
    text[..offset].trim_end().ends_with('.')
}

/// Smallest node covering the byte at `offset`
pub(crate) fn node_at<'t>(root: &Node<'t>, offset: usize) -> Option<Node<'t>> {
    root.descendant_for_byte_range(offset, offset + 1)
}

/// The call (or `new`) expression starting exactly at `offset`
pub(crate) fn call_at<'t>(root: &Node<'t>, offset: usize) -> Option<Node<'t>> {
    let mut node = node_at(root, offset)?;
    loop {
        if node.start_byte() != offset {
            return None;
        }
        if matches!(node.kind(), "call_expression" | "new_expression") {
            return Some(node);
        }
        node = node.parent()?;
    }
}

/// Nearest ancestor (or self) of a given kind around `offset`
pub(crate) fn ancestor_of_kind<'t>(root: &Node<'t>, offset: usize, kind: &str) -> Option<Node<'t>> {
    let mut node = node_at(root, offset)?;
    loop {
        if node.kind() == kind {
            return Some(node);
        }
        node = node.parent()?;
    }
}

/// Whether a `codemend-ignore` marker on the same or previous line covers `code`
pub fn is_suppressed(text: &str, offset: usize, code: &str) -> bool {
    let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line_end = text[offset..]
        .find('\n')
        .map(|i| offset + i)
        .unwrap_or(text.len());
    if marker_covers(&text[line_start..line_end], code) {
        return true;
    }
    if line_start == 0 {
        return false;
    }
    let prev_end = line_start - 1;
    let prev_start = text[..prev_end].rfind('\n').map(|i| i + 1).unwrap_or(0);
    marker_covers(&text[prev_start..prev_end], code)
}

fn marker_covers(line: &str, code: &str) -> bool {
    let Some(pos) = line.find(SUPPRESS_MARKER) else {
        return false;
    };
    let rest = line[pos + SUPPRESS_MARKER.len()..].trim_start();
    match rest.strip_prefix(':') {
        Some(codes) => codes
            .split(|c: char| c == ',' || c.is_whitespace())
            .any(|c| c.trim() == code),
        None => true,
    }
}
