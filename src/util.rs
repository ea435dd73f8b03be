use crate::model::Span;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path};
use tree_sitter::Node;

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

pub fn normalize_rel_path(repo_root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(repo_root).with_context(|| {
        format!(
            "strip prefix {} from {}",
            repo_root.display(),
            path.display()
        )
    })?;
    Ok(normalize_path(rel))
}

pub fn normalize_path(path: &Path) -> String {
    let mut parts = Vec::new();
    for comp in path.components() {
        match comp {
            Component::Normal(os) => parts.push(os.to_string_lossy().to_string()),
            Component::ParentDir => parts.push("..".to_string()),
            Component::CurDir => {}
            _ => {}
        }
    }
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Directory part of a file id, `""` for files at the project root.
pub fn parent_dir(file_id: &str) -> &str {
    match file_id.rfind('/') {
        Some(idx) => &file_id[..idx],
        None => "",
    }
}

/// Lexically joins `rel` onto the project-relative directory `base`.
/// Returns `None` when the result would climb above the project root.
pub fn join_normalized(base: &str, rel: &str) -> Option<String> {
    let mut parts: Vec<&str> = base
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect();
    for part in rel.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

pub fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// Every node under `root` (inclusive), visited depth-first in source order.
pub fn descendants<'tree>(root: Node<'tree>) -> Vec<Node<'tree>> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        out.push(node);
        let mut cursor = node.walk();
        let children: Vec<Node<'tree>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    out
}

/// Re-finds the outermost node covering exactly `span`.
pub fn node_for_span<'tree>(root: Node<'tree>, span: &Span) -> Option<Node<'tree>> {
    let mut node = root.descendant_for_byte_range(span.start_byte, span.end_byte)?;
    if node.start_byte() != span.start_byte || node.end_byte() != span.end_byte {
        return None;
    }
    while let Some(parent) = node.parent() {
        if parent.start_byte() == node.start_byte() && parent.end_byte() == node.end_byte() {
            node = parent;
        } else {
            break;
        }
    }
    Some(node)
}

/// Merges overlapping or touching byte ranges.
pub fn merge_ranges(mut ranges: Vec<(usize, usize)>) -> Vec<(usize, usize)> {
    ranges.retain(|(start, end)| start < end);
    ranges.sort_unstable();
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// Removes byte ranges from `text`. Ranges may overlap and come in any order.
pub fn remove_ranges(text: &str, ranges: Vec<(usize, usize)>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end) in merge_ranges(ranges) {
        let start = start.min(text.len());
        let end = end.min(text.len());
        if start < cursor {
            continue;
        }
        out.push_str(text.get(cursor..start).unwrap_or(""));
        cursor = end;
    }
    out.push_str(text.get(cursor..).unwrap_or(""));
    out
}

/// Applies non-overlapping replacements. Later edits that overlap an earlier
/// one are skipped.
pub fn apply_edits(text: &str, mut edits: Vec<(usize, usize, String)>) -> String {
    edits.sort_by_key(|(start, end, _)| (*start, *end));
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end, replacement) in edits {
        if start < cursor || end > text.len() {
            continue;
        }
        out.push_str(text.get(cursor..start).unwrap_or(""));
        out.push_str(&replacement);
        cursor = end;
    }
    out.push_str(text.get(cursor..).unwrap_or(""));
    out
}

/// Drops lines holding only `;`, strips trailing whitespace, and caps runs of
/// blank lines at `max_blank`.
pub fn compact_lines(text: &str, max_blank: usize) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blank_run = 0;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed == ";" {
            continue;
        }
        if trimmed.is_empty() {
            if out.is_empty() {
                continue;
            }
            blank_run += 1;
            if blank_run > max_blank {
                continue;
            }
            out.push("");
        } else {
            blank_run = 0;
            out.push(line.trim_end());
        }
    }
    while out.last().is_some_and(|line| line.is_empty()) {
        out.pop();
    }
    if out.is_empty() {
        return String::new();
    }
    let mut joined = out.join("\n");
    joined.push('\n');
    joined
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_normalized_resolves_parent_segments() {
        assert_eq!(join_normalized("src/a", "../b/c.h").as_deref(), Some("src/b/c.h"));
        assert_eq!(join_normalized("", "x.h").as_deref(), Some("x.h"));
        assert_eq!(join_normalized("", "../x.h"), None);
    }

    #[test]
    fn remove_ranges_merges_overlaps() {
        let text = "0123456789";
        assert_eq!(remove_ranges(text, vec![(2, 5), (4, 7)]), "01789");
        assert_eq!(remove_ranges(text, vec![(8, 10), (0, 1)]), "1234567");
    }

    #[test]
    fn compact_lines_is_idempotent() {
        let text = "a\n;\n\n\n\nb\n  ;  \nc\n\n";
        let once = compact_lines(text, 1);
        assert_eq!(once, "a\n\nb\nc\n");
        assert_eq!(compact_lines(&once, 1), once);
    }
}
