//! Source code parsing using tree-sitter
//!
//! Turns one file's text into an immutable syntax tree and offers the few
//! structural queries the pipeline needs: syntax diagnostics, import
//! specifiers, the enclosing named function of a byte range and the
//! top-level statement containing it.

use crate::error::{PipelineError, PipelineResult};
use crate::models::TextRange;
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Parser, Tree};

/// Supported source languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
    Tsx,
}

impl Language {
    /// Pick the grammar from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Self::from_extension(ext)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            "ts" | "mts" | "cts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            _ => None,
        }
    }

    fn grammar(self) -> tree_sitter::Language {
        match self {
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

/// All file extensions the parser understands
pub fn supported_extensions() -> &'static [&'static str] {
    &["js", "jsx", "mjs", "cjs", "ts", "mts", "cts", "tsx"]
}

/// Parse `text` with the grammar for `language`
pub fn parse_text(language: Language, text: &str) -> PipelineResult<Tree> {
    let mut parser = Parser::new();
    parser
        .set_language(&language.grammar())
        .map_err(|e| PipelineError::parse("<memory>", format!("grammar error: {}", e)))?;
    parser
        .parse(text, None)
        .ok_or_else(|| PipelineError::parse("<memory>", "parser returned no tree"))
}

/// A parse problem at a position in the text
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SyntaxDiagnostic {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
    pub message: String,
}

impl std::fmt::Display for SyntaxDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

/// Collect error and missing nodes from a tree
pub fn diagnostics(tree: &Tree) -> Vec<SyntaxDiagnostic> {
    let mut out = Vec::new();
    let root = tree.root_node();
    if !root.has_error() {
        return out;
    }

    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_missing() {
            out.push(diagnostic_at(&node, format!("missing `{}`", node.kind())));
            continue;
        }
        if node.is_error() {
            out.push(diagnostic_at(&node, "unexpected syntax".to_string()));
            continue;
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        // Reverse so diagnostics come out in source order
        stack.extend(children.into_iter().rev());
    }
    out
}

fn diagnostic_at(node: &Node, message: String) -> SyntaxDiagnostic {
    let pos = node.start_position();
    SyntaxDiagnostic {
        line: pos.row as u32 + 1,
        column: pos.column as u32 + 1,
        offset: node.start_byte(),
        message,
    }
}

/// Parse `text` and return its diagnostics (empty when the text is well formed)
pub fn check_syntax(language: Language, text: &str) -> PipelineResult<Vec<SyntaxDiagnostic>> {
    let tree = parse_text(language, text)?;
    Ok(diagnostics(&tree))
}

/// One analyzed file: path, raw text and parsed tree. Immutable once read.
pub struct SourceUnit {
    path: PathBuf,
    text: String,
    language: Language,
    tree: Tree,
    lines: LineIndex,
}

impl std::fmt::Debug for SourceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceUnit")
            .field("path", &self.path)
            .field("language", &self.language)
            .field("len", &self.text.len())
            .finish()
    }
}

impl SourceUnit {
    /// Parse a file's text. A file that does not parse cleanly is a
    /// [`PipelineError::Parse`]: analysis and validation need a clean baseline.
    pub fn parse(path: impl Into<PathBuf>, text: impl Into<String>) -> PipelineResult<Self> {
        let path = path.into();
        let text = text.into();
        let language = Language::from_path(&path)
            .ok_or_else(|| PipelineError::parse(&path, "unsupported file extension"))?;
        let tree = parse_text(language, &text).map_err(|e| match e {
            PipelineError::Parse { message, .. } => PipelineError::parse(&path, message),
            other => other,
        })?;
        if let Some(first) = diagnostics(&tree).into_iter().next() {
            return Err(PipelineError::parse(&path, first.to_string()));
        }
        let lines = LineIndex::new(&text);
        Ok(Self {
            path,
            text,
            language,
            tree,
            lines,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn lines(&self) -> &LineIndex {
        &self.lines
    }

    /// Source text of a node
    pub fn node_text(&self, node: &Node) -> &str {
        node.utf8_text(self.text.as_bytes()).unwrap_or("")
    }

    /// Relative and bare import specifiers with their positions
    pub fn imports(&self) -> Vec<ImportRef> {
        extract_imports(&self.root(), self.text.as_bytes())
    }

    /// Innermost named function containing `range`
    pub fn enclosing_function(&self, range: TextRange) -> Option<FunctionSpan> {
        enclosing_function(&self.root(), self.text.as_bytes(), range)
    }

    /// Range of the top-level statement containing `range`
    pub fn top_level_statement(&self, range: TextRange) -> Option<TextRange> {
        top_level_statement(&self.root(), range)
    }
}

/// Maps byte offsets to 1-based line/column positions
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// 1-based (line, column) of a byte offset
    pub fn position(&self, offset: usize) -> (u32, u32) {
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let column = offset - self.starts[line];
        (line as u32 + 1, column as u32 + 1)
    }

    /// Byte offset of the start of a 1-based line
    pub fn line_start(&self, line: u32) -> Option<usize> {
        self.starts.get((line as usize).checked_sub(1)?).copied()
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }
}

/// An import specifier found in a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub specifier: String,
    /// 1-based line of the import statement
    pub line: u32,
    pub range: TextRange,
}

impl ImportRef {
    pub fn is_relative(&self) -> bool {
        self.specifier.starts_with("./") || self.specifier.starts_with("../")
    }
}

/// Extract `import ... from`, `export ... from`, `require("...")` and
/// `import("...")` specifiers
pub fn extract_imports(root: &Node, source: &[u8]) -> Vec<ImportRef> {
    let mut imports = Vec::new();
    let mut stack = vec![*root];

    while let Some(node) = stack.pop() {
        match node.kind() {
            "import_statement" | "export_statement" => {
                if let Some(src) = node.child_by_field_name("source") {
                    push_import(&mut imports, &node, &src, source);
                }
            }
            "call_expression" => {
                if let (Some(func), Some(args)) = (
                    node.child_by_field_name("function"),
                    node.child_by_field_name("arguments"),
                ) {
                    let is_require = func.kind() == "identifier"
                        && func.utf8_text(source).map(|t| t == "require").unwrap_or(false);
                    let is_dynamic_import = func.kind() == "import";
                    if is_require || is_dynamic_import {
                        if let Some(first) = args.named_child(0) {
                            if first.kind() == "string" {
                                push_import(&mut imports, &node, &first, source);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    imports
}

fn push_import(imports: &mut Vec<ImportRef>, stmt: &Node, string_node: &Node, source: &[u8]) {
    let Ok(raw) = string_node.utf8_text(source) else {
        return;
    };
    let specifier = raw
        .trim_start_matches(['"', '\'', '`'])
        .trim_end_matches(['"', '\'', '`'])
        .to_string();
    if specifier.is_empty() {
        return;
    }
    imports.push(ImportRef {
        specifier,
        line: stmt.start_position().row as u32 + 1,
        range: TextRange::new(stmt.start_byte(), stmt.end_byte()),
    });
}

/// Function node kinds counted as declared functions
pub const FUNCTION_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "function",
    "generator_function",
    "arrow_function",
    "method_definition",
];

/// A named function that can be loaded on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpan {
    pub name: String,
    /// Range of the whole declaration (including `const name =` for bound expressions)
    pub range: TextRange,
    pub params: usize,
}

/// Innermost named, standalone function whose declaration contains `range`.
///
/// Methods are skipped: they cannot be exercised without their class.
pub fn enclosing_function(root: &Node, source: &[u8], range: TextRange) -> Option<FunctionSpan> {
    let mut node = root.descendant_for_byte_range(range.start, range.end)?;
    loop {
        if let Some(span) = as_named_function(&node, source) {
            if span.range.contains(&range) {
                return Some(span);
            }
        }
        node = node.parent()?;
    }
}

fn as_named_function(node: &Node, source: &[u8]) -> Option<FunctionSpan> {
    match node.kind() {
        "function_declaration" | "generator_function_declaration" => {
            let name = node.child_by_field_name("name")?.utf8_text(source).ok()?;
            let params = count_params(node.child_by_field_name("parameters"));
            Some(FunctionSpan {
                name: name.to_string(),
                range: TextRange::new(node.start_byte(), node.end_byte()),
                params,
            })
        }
        "lexical_declaration" | "variable_declaration" => {
            if node.named_child_count() != 1 {
                return None;
            }
            let declarator = node.named_child(0)?;
            if declarator.kind() != "variable_declarator" {
                return None;
            }
            let value = declarator.child_by_field_name("value")?;
            if !matches!(
                value.kind(),
                "arrow_function" | "function_expression" | "function"
            ) {
                return None;
            }
            let name_node = declarator.child_by_field_name("name")?;
            if name_node.kind() != "identifier" {
                return None;
            }
            let params = value
                .child_by_field_name("parameters")
                .map(|p| count_params(Some(p)))
                .unwrap_or(1);
            Some(FunctionSpan {
                name: name_node.utf8_text(source).ok()?.to_string(),
                range: TextRange::new(node.start_byte(), node.end_byte()),
                params,
            })
        }
        _ => None,
    }
}

fn count_params(params: Option<Node>) -> usize {
    params.map(|p| p.named_child_count()).unwrap_or(0)
}

/// Range of the direct child of `program` that contains `range`
pub fn top_level_statement(root: &Node, range: TextRange) -> Option<TextRange> {
    let mut node = root.descendant_for_byte_range(range.start, range.end)?;
    if node.id() == root.id() {
        return None;
    }
    loop {
        let parent = node.parent()?;
        if parent.id() == root.id() {
            return Some(TextRange::new(node.start_byte(), node.end_byte()));
        }
        node = parent;
    }
}

#[cfg(test)]
mod tests;
