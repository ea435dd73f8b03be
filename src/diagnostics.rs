use crate::model::Span;
use blake3::Hasher;
use serde::Serialize;
use std::collections::HashSet;
use tree_sitter::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// A non-fatal problem found while reading a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub path: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
    pub severity: Severity,
    pub rule_id: String,
    pub message: String,
    pub snippet: Option<String>,
    pub fingerprint: String,
}

impl Diagnostic {
    pub fn new(path: &str, severity: Severity, rule_id: &str, message: impl Into<String>) -> Self {
        let mut diagnostic = Self {
            path: path.to_string(),
            line: None,
            column: None,
            severity,
            rule_id: rule_id.to_string(),
            message: message.into(),
            snippet: None,
            fingerprint: String::new(),
        };
        diagnostic.fingerprint = diagnostic.compute_fingerprint();
        diagnostic
    }

    pub fn at(mut self, span: &Span, source: &str) -> Self {
        self.line = Some(span.start_row + 1);
        self.column = Some(span.start_col + 1);
        let snippet = collapse_whitespace(span.text(source));
        self.snippet = if snippet.is_empty() {
            None
        } else {
            Some(truncate_chars(&snippet, 120))
        };
        self.fingerprint = self.compute_fingerprint();
        self
    }

    fn compute_fingerprint(&self) -> String {
        let mut hasher = Hasher::new();
        push_str(&mut hasher, &self.path);
        push_opt_usize(&mut hasher, self.line);
        push_opt_usize(&mut hasher, self.column);
        push_str(&mut hasher, &self.rule_id);
        push_str(&mut hasher, &self.message);
        push_opt_str(&mut hasher, self.snippet.as_deref());
        hasher.finalize().to_hex().to_string()
    }
}

/// Collects diagnostics, dropping repeats by fingerprint.
#[derive(Debug, Default)]
pub struct Diagnostics {
    seen: HashSet<String>,
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.seen.insert(diagnostic.fingerprint.clone()) {
            tracing::debug!(
                path = %diagnostic.path,
                rule = %diagnostic.rule_id,
                "{}",
                diagnostic.message
            );
            self.items.push(diagnostic);
        }
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.push(diagnostic);
        }
    }

    pub fn into_vec(mut self) -> Vec<Diagnostic> {
        self.items.sort_by(|a, b| {
            (&a.path, a.line, a.column, &a.rule_id).cmp(&(&b.path, b.line, b.column, &b.rule_id))
        });
        self.items
    }
}

/// Reports ERROR and MISSING nodes left by error recovery.
pub fn syntax_errors(path: &str, root: Node<'_>, source: &str) -> Vec<Diagnostic> {
    if !root.has_error() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() {
            out.push(
                Diagnostic::new(path, Severity::Error, "syntax-error", "unparseable source")
                    .at(&Span::of(node), source),
            );
            continue;
        }
        if node.is_missing() {
            out.push(
                Diagnostic::new(
                    path,
                    Severity::Warning,
                    "syntax-missing",
                    format!("missing `{}`", node.kind()),
                )
                .at(&Span::of(node), source),
            );
            continue;
        }
        if node.has_error() {
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }
    }
    out
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn push_opt_str(hasher: &mut Hasher, value: Option<&str>) {
    match value {
        Some(value) => push_str(hasher, value),
        None => push_str(hasher, "-"),
    }
}

fn push_opt_usize(hasher: &mut Hasher, value: Option<usize>) {
    match value {
        Some(value) => push_str(hasher, &value.to_string()),
        None => push_str(hasher, "-"),
    }
}

fn push_str(hasher: &mut Hasher, value: &str) {
    hasher.update(value.as_bytes());
    hasher.update(b"\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_diagnostics_collapse() {
        let mut diagnostics = Diagnostics::default();
        diagnostics.push(Diagnostic::new("a.c", Severity::Warning, "r", "m"));
        diagnostics.push(Diagnostic::new("a.c", Severity::Warning, "r", "m"));
        diagnostics.push(Diagnostic::new("b.c", Severity::Warning, "r", "m"));
        assert_eq!(diagnostics.into_vec().len(), 2);
    }

    #[test]
    fn unparseable_source_is_an_error() {
        let source = ")))\n";
        let mut parser = crate::source::new_parser(crate::model::Language::Python).unwrap();
        let tree = crate::source::parse(&mut parser, "t.py", source).unwrap();
        let found = syntax_errors("t.py", tree.root_node(), source);
        assert!(!found.is_empty());
        assert!(
            found
                .iter()
                .any(|d| d.rule_id == "syntax-error" && d.severity == Severity::Error)
        );
    }
}
