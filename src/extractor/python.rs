use super::{Closure, ExtractOptions, cut_unkept, output_files};
use crate::analysis::Analysis;
use crate::error::EngineError;
use crate::model::{Language, Span};
use crate::registry::{ImportMember, ImportStatement};
use crate::source::{Project, SourceFile, new_parser, parse};
use crate::util::{apply_edits, compact_lines, node_for_span, remove_ranges};
use std::collections::BTreeMap;
use tree_sitter::Node;

const MAX_BLANK_LINES: usize = 2;

pub(crate) fn slice(
    analysis: &Analysis,
    closure: &Closure,
    options: &ExtractOptions,
) -> Result<BTreeMap<String, String>, EngineError> {
    let mut cut: BTreeMap<String, String> = BTreeMap::new();
    for file in output_files(analysis, closure, options) {
        let source = analysis
            .project()
            .file(&file)
            .ok_or_else(|| EngineError::MissingFile(file.clone()))?;
        let entry = analysis.registry().require_file(&file)?;
        let root = source.root();
        let mut items: Vec<Node<'_>> = entry
            .symbols
            .values()
            .flat_map(|symbol| symbol.nodes().iter())
            .filter_map(|span| node_for_span(root, span))
            .collect();
        items.sort_by_key(|node| (node.start_byte(), node.end_byte()));
        items.dedup_by_key(|node| (node.start_byte(), node.end_byte()));
        let extra = options.remove.get(&file).map(Vec::as_slice).unwrap_or(&[]);
        let text = cut_unkept(source, entry, &items, &closure.kept(&file), extra);
        cut.insert(file, text);
    }

    // Imports are judged against the sliced file set, not the original one.
    let sliced = Analysis::new(
        Project::from_sources(Language::Python, cut.iter().map(|(id, text)| (id, text.clone())))?,
        analysis.options().clone(),
    );
    let mut parser = new_parser(Language::Python)?;
    let mut out = BTreeMap::new();
    for source in sliced.project().files() {
        let cleaned = clean_imports(analysis, &sliced, source)?;
        let tree = parse(&mut parser, &source.id, &cleaned)?;
        let repaired = remove_ranges(&cleaned, error_ranges(tree.root_node()));
        out.insert(source.id.clone(), compact_lines(&repaired, MAX_BLANK_LINES));
    }
    Ok(out)
}

/// Drops imports that resolved before slicing but no longer do. Imports
/// of external modules are left alone.
fn clean_imports(
    original: &Analysis,
    sliced: &Analysis,
    source: &SourceFile,
) -> Result<String, EngineError> {
    let entry = sliced.registry().require_file(&source.id)?;
    let Some(items) = sliced.item_resolver() else {
        return Ok(source.text.clone());
    };
    let before = original.module_resolver();
    let after = sliced.module_resolver();
    let file = source.id.as_str();

    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    for statement in &entry.imports {
        match statement {
            ImportStatement::Module { span, members } => {
                let kept: Vec<&ImportMember> = members
                    .iter()
                    .filter(|member| {
                        !before.resolve(file, &member.name).is_resolved()
                            || after.resolve(file, &member.name).is_resolved()
                    })
                    .collect();
                if kept.len() < members.len() {
                    edits.push(rewrite(span, "import ", &kept));
                }
            }
            ImportStatement::From {
                span,
                module,
                members,
                wildcard,
            } => {
                if !before.resolve(file, module).is_resolved() {
                    continue;
                }
                let target = after.resolve(file, module);
                if !target.is_resolved() {
                    edits.push((span.start_byte, span.end_byte, String::new()));
                    continue;
                }
                if *wildcard {
                    continue;
                }
                let kept: Vec<&ImportMember> = members
                    .iter()
                    .filter(|member| items.resolve_item(&target, &member.name).is_some())
                    .collect();
                if kept.len() < members.len() {
                    edits.push(rewrite(span, &format!("from {module} import "), &kept));
                }
            }
        }
    }
    Ok(apply_edits(&source.text, edits))
}

fn rewrite(span: &Span, prefix: &str, kept: &[&ImportMember]) -> (usize, usize, String) {
    if kept.is_empty() {
        return (span.start_byte, span.end_byte, String::new());
    }
    let names: Vec<String> = kept
        .iter()
        .map(|member| match &member.alias {
            Some(alias) => format!("{} as {alias}", member.name),
            None => member.name.clone(),
        })
        .collect();
    (span.start_byte, span.end_byte, format!("{prefix}{}", names.join(", ")))
}

/// Outermost ERROR nodes left behind by removals.
fn error_ranges(root: Node<'_>) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() {
            ranges.push((node.start_byte(), node.end_byte()));
            continue;
        }
        if node.has_error() {
            let mut cursor = node.walk();
            stack.extend(node.children(&mut cursor));
        }
    }
    ranges
}
