use crate::model::{Language, Metrics};
use crate::util::{descendants, node_text, remove_ranges};
use tree_sitter::Node;

const PYTHON_DECISIONS: &[&str] = &[
    "if_statement",
    "elif_clause",
    "for_statement",
    "while_statement",
    "except_clause",
    "with_statement",
    "try_statement",
    "conditional_expression",
    "boolean_operator",
    "if_clause",
    "for_in_clause",
    "case_clause",
];

const C_DECISIONS: &[&str] = &[
    "if_statement",
    "for_statement",
    "while_statement",
    "do_statement",
    "case_statement",
    "conditional_expression",
];

/// Size and complexity of a set of nodes. Lines and characters add up;
/// complexity is one plus every decision point found.
pub fn analyze(nodes: &[Node<'_>], source: &str, language: Language) -> Metrics {
    let mut metrics = Metrics {
        cyclomatic_complexity: 1,
        ..Metrics::default()
    };
    for node in nodes {
        let measured = measure(*node, source, language);
        metrics.lines_count += measured.lines;
        metrics.code_line_count += measured.code_lines;
        metrics.character_count += measured.chars;
        metrics.code_character_count += measured.code_chars;
        metrics.cyclomatic_complexity += measured.decisions;
    }
    metrics
}

struct Measured {
    lines: usize,
    code_lines: usize,
    chars: usize,
    code_chars: usize,
    decisions: usize,
}

fn measure(node: Node<'_>, source: &str, language: Language) -> Measured {
    let text = node_text(node, source);
    let base = node.start_byte();
    let mut comments = Vec::new();
    let mut decisions = 0;
    for child in descendants(node) {
        if child.kind() == "comment" {
            comments.push((child.start_byte() - base, child.end_byte() - base));
        } else if is_decision(child, source, language) {
            decisions += 1;
        }
    }
    let code = remove_ranges(text, comments);
    let collapsed = code.split_whitespace().collect::<Vec<_>>().join(" ");
    Measured {
        lines: node.end_position().row - node.start_position().row + 1,
        code_lines: code.lines().filter(|line| !line.trim().is_empty()).count(),
        chars: text.chars().count(),
        code_chars: collapsed.chars().count(),
        decisions,
    }
}

fn is_decision(node: Node<'_>, source: &str, language: Language) -> bool {
    match language {
        Language::Python => PYTHON_DECISIONS.contains(&node.kind()),
        Language::C => {
            if C_DECISIONS.contains(&node.kind()) {
                return true;
            }
            node.kind() == "binary_expression"
                && node
                    .child_by_field_name("operator")
                    .is_some_and(|op| matches!(node_text(op, source), "&&" | "||"))
        }
    }
}

/// Metrics of a whole file.
pub fn file_metrics(root: Node<'_>, source: &str, language: Language) -> Metrics {
    let mut metrics = analyze(&[root], source, language);
    // The root ends after the trailing newline; count lines as an editor does.
    metrics.lines_count = source.lines().count().max(1);
    metrics.code_line_count = metrics.code_line_count.min(metrics.lines_count);
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{new_parser, parse};

    fn python_metrics(source: &str) -> Metrics {
        let mut parser = new_parser(Language::Python).unwrap();
        let tree = parse(&mut parser, "t.py", source).unwrap();
        let root = tree.root_node();
        let function = root.named_child(0).unwrap();
        analyze(&[function], source, Language::Python)
    }

    #[test]
    fn straight_line_code_has_base_complexity() {
        let metrics = python_metrics("def f():\n    return 1\n");
        assert_eq!(metrics.cyclomatic_complexity, 1);
        assert_eq!(metrics.lines_count, 2);
        assert_eq!(metrics.code_line_count, 2);
    }

    #[test]
    fn comments_are_not_code() {
        let metrics = python_metrics("def f():\n    # note\n    return 1\n");
        assert_eq!(metrics.lines_count, 3);
        assert_eq!(metrics.code_line_count, 2);
        assert!(metrics.code_character_count < metrics.character_count);
    }

    #[test]
    fn branches_and_boolean_operators_count() {
        let source = "def f(a, b):\n    if a and b:\n        return 1\n    elif a:\n        return 2\n    return 3\n";
        let metrics = python_metrics(source);
        // if + elif + and
        assert_eq!(metrics.cyclomatic_complexity, 4);
    }

    #[test]
    fn try_blocks_count_with_their_handlers() {
        let source = "def f():\n    try:\n        return 1\n    except ValueError:\n        return 2\n";
        // try + except
        assert_eq!(python_metrics(source).cyclomatic_complexity, 3);
    }

    #[test]
    fn sibling_nodes_add_up_with_one_base() {
        let source = "def f(a):\n    if a:\n        return 1\n    return 2\n\n\ndef g(b):\n    while b:\n        b -= 1\n    return b or 0\n";
        let mut parser = new_parser(Language::Python).unwrap();
        let tree = parse(&mut parser, "t.py", source).unwrap();
        let root = tree.root_node();
        let first = root.named_child(0).unwrap();
        let second = root.named_child(1).unwrap();

        let f = analyze(&[first], source, Language::Python);
        let g = analyze(&[second], source, Language::Python);
        let both = analyze(&[first, second], source, Language::Python);

        assert_eq!(both.lines_count, f.lines_count + g.lines_count);
        assert_eq!(both.lines_count, 8);
        assert_eq!(both.code_line_count, f.code_line_count + g.code_line_count);
        assert_eq!(both.character_count, f.character_count + g.character_count);
        assert_eq!(
            both.code_character_count,
            f.code_character_count + g.code_character_count
        );

        // if | while + or
        assert_eq!(f.cyclomatic_complexity, 2);
        assert_eq!(g.cyclomatic_complexity, 3);
        // One base for the set, not one per node.
        assert_eq!(both.cyclomatic_complexity, 4);
        assert_ne!(
            both.cyclomatic_complexity,
            f.cyclomatic_complexity + g.cyclomatic_complexity
        );
        assert!(both.code_line_count <= both.lines_count);
        assert!(both.code_character_count <= both.character_count);
    }

    #[test]
    fn c_logical_operators_count() {
        let source = "int f(int a, int b) { if (a && b) { return 1; } return a > b ? a : b; }\n";
        let mut parser = new_parser(Language::C).unwrap();
        let tree = parse(&mut parser, "t.c", source).unwrap();
        let function = tree.root_node().named_child(0).unwrap();
        let metrics = analyze(&[function], source, Language::C);
        // if + && + ?:
        assert_eq!(metrics.cyclomatic_complexity, 4);
    }
}
