//! Cyclomatic complexity and token statistics from one tree traversal
//!
//! Complexity starts at 1 and grows by one for every branching construct
//! (conditional, loop, case clause, catch clause, ternary, `&&`, `||`) and
//! for every function, method or arrow function declared.

use crate::parsers::FUNCTION_KINDS;
use std::collections::HashSet;
use tree_sitter::Node;

/// Counts gathered while walking a tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TreeStats {
    pub complexity: u32,
    pub functions: usize,
    /// Leaf tokens (Halstead length)
    pub tokens: usize,
    /// Distinct leaf token texts (Halstead vocabulary)
    pub distinct_tokens: usize,
}

/// Complexity added by a single node
pub fn branch_weight(node: &Node) -> u32 {
    match node.kind() {
        "if_statement" | "for_statement" | "for_in_statement" | "for_of_statement"
        | "while_statement" | "do_statement" | "switch_case" | "catch_clause"
        | "ternary_expression" => 1,
        "binary_expression" => match node.child_by_field_name("operator").map(|op| op.kind()) {
            Some("&&") | Some("||") => 1,
            _ => 0,
        },
        kind if FUNCTION_KINDS.contains(&kind) => 1,
        _ => 0,
    }
}

/// Depth-first walk accumulating complexity, function count and token statistics
pub fn tree_stats(root: &Node, source: &[u8]) -> TreeStats {
    let mut stats = TreeStats {
        complexity: 1,
        ..Default::default()
    };
    let mut vocabulary: HashSet<&[u8]> = HashSet::new();
    let mut stack = vec![*root];

    while let Some(node) = stack.pop() {
        let weight = branch_weight(&node);
        stats.complexity += weight;
        if FUNCTION_KINDS.contains(&node.kind()) {
            stats.functions += 1;
        }

        if node.child_count() == 0 {
            if node.kind() != "comment" {
                stats.tokens += 1;
                if let Some(text) = source.get(node.start_byte()..node.end_byte()) {
                    vocabulary.insert(text);
                }
            }
            continue;
        }

        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }

    stats.distinct_tokens = vocabulary.len();
    stats
}

/// Cyclomatic complexity of the subtree rooted at `node`
pub fn cyclomatic_complexity(node: &Node, source: &[u8]) -> u32 {
    tree_stats(node, source).complexity
}

/// Deterministic static cost of a subtree.
///
/// Every node costs one; loops cost ten more, calls and `new` three more.
/// Used as the performance proxy of the behavior stage.
pub fn static_cost(node: &Node) -> u64 {
    let mut cost = 0u64;
    let mut stack = vec![*node];
    while let Some(n) = stack.pop() {
        cost += 1;
        cost += match n.kind() {
            "for_statement" | "for_in_statement" | "for_of_statement" | "while_statement"
            | "do_statement" => 10,
            "call_expression" | "new_expression" => 3,
            _ => 0,
        };
        let mut cursor = n.walk();
        stack.extend(n.children(&mut cursor));
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::SourceUnit;

    fn complexity_of(source: &str) -> u32 {
        let unit = SourceUnit::parse("/repo/a.js", source).expect("should parse");
        cyclomatic_complexity(&unit.root(), unit.text().as_bytes())
    }

    #[test]
    fn test_simple_function_is_two() {
        assert_eq!(complexity_of("function f(a,b){ return a+b; }"), 2);
    }

    #[test]
    fn test_one_if_adds_one() {
        assert_eq!(
            complexity_of("function f(a,b){ if (a) { return b; } return a+b; }"),
            3
        );
    }

    #[test]
    fn test_empty_file_is_one() {
        assert_eq!(complexity_of(""), 1);
    }

    #[test]
    fn test_every_construct_counts() {
        let source = r#"
function g(xs) {
  for (let i = 0; i < xs.length; i++) {}
  for (const x of xs) {}
  while (false) {}
  do {} while (false);
  switch (xs.length) { case 0: break; case 1: break; default: break; }
  try { g(); } catch (e) {}
  const t = xs ? 1 : 2;
  return xs && xs.length || 0;
}
const h = () => 1;
class C { m() { return 1; } }
"#;
        // base 1 + 3 functions + 2 for + while + do + 2 cases + catch + ternary + && + ||
        assert_eq!(complexity_of(source), 1 + 3 + 2 + 1 + 1 + 2 + 1 + 1 + 2);
    }

    #[test]
    fn test_arithmetic_operators_do_not_count() {
        assert_eq!(complexity_of("const x = 1 + 2 * 3 - (4 | 5) & 6;"), 1);
    }

    #[test]
    fn test_stats_count_functions_and_tokens() {
        let unit = SourceUnit::parse("/repo/a.js", "function f() { return 1; }\nfunction g() {}\n")
            .expect("should parse");
        let stats = tree_stats(&unit.root(), unit.text().as_bytes());
        assert_eq!(stats.functions, 2);
        assert!(stats.tokens > stats.distinct_tokens);
    }

    #[test]
    fn test_static_cost_grows_with_loops() {
        let plain = SourceUnit::parse("/repo/a.js", "function f(a) { return a; }").expect("parse");
        let looped = SourceUnit::parse(
            "/repo/b.js",
            "function f(a) { for (;;) { break; } return a; }",
        )
        .expect("parse");
        assert!(static_cost(&looped.root()) > static_cost(&plain.root()) + 10);
    }
}
