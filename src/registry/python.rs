use super::{Extracted, FileEntry, ImportMember, ImportStatement};
use crate::diagnostics::syntax_errors;
use crate::model::{DataTypeKind, FunctionRole, Language, Span, Symbol, SymbolCore};
use crate::source::SourceFile;
use crate::util::{descendants, node_text};
use std::collections::BTreeSet;
use tree_sitter::Node;

pub(crate) fn extract(file: &SourceFile) -> Extracted {
    let source = file.text.as_str();
    let root = file.root();
    let mut entry = FileEntry::new(&file.id, Language::Python);

    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        match node.kind() {
            "class_definition" | "function_definition" => {
                declare_definition(&mut entry, node, node, source)
            }
            "decorated_definition" => {
                if let Some(definition) = node.child_by_field_name("definition") {
                    declare_definition(&mut entry, node, definition, source);
                }
            }
            "expression_statement" => declare_assignments(&mut entry, node, source),
            _ => {}
        }
    }
    entry.imports = collect_imports(root, source);

    Extracted {
        diagnostics: syntax_errors(&file.id, root, source),
        entry,
        typedef_targets: Vec::new(),
    }
}

fn declare_definition(entry: &mut FileEntry, outer: Node<'_>, definition: Node<'_>, source: &str) {
    let Some(name_node) = definition.child_by_field_name("name") else {
        return;
    };
    let core = SymbolCore::new(
        &entry.id,
        node_text(name_node, source),
        Span::of(outer),
        Span::of(name_node),
    );
    let symbol = if definition.kind() == "class_definition" {
        Symbol::DataType {
            core,
            kind: DataTypeKind::Class,
            typedefs: BTreeSet::new(),
        }
    } else {
        Symbol::Function {
            core,
            role: FunctionRole::Definition,
            is_macro: false,
            counterpart: None,
        }
    };
    insert(entry, symbol);
}

fn declare_assignments(entry: &mut FileEntry, statement: Node<'_>, source: &str) {
    let mut cursor = statement.walk();
    for child in statement.named_children(&mut cursor) {
        match child.kind() {
            "assignment" => {
                // `a = b = value` nests assignments on the right.
                let mut current = Some(child);
                while let Some(assignment) = current.filter(|node| node.kind() == "assignment") {
                    if let Some(left) = assignment.child_by_field_name("left") {
                        if is_all_target(left, source) {
                            entry.exports =
                                Some(string_list(assignment.child_by_field_name("right"), source));
                        } else {
                            for identifier in assigned_identifiers(left) {
                                declare_variable(entry, statement, identifier, source);
                            }
                        }
                    }
                    current = assignment.child_by_field_name("right");
                }
            }
            "augmented_assignment" => {
                let Some(left) = child.child_by_field_name("left") else {
                    continue;
                };
                if is_all_target(left, source) {
                    let extra = string_list(child.child_by_field_name("right"), source);
                    entry.exports.get_or_insert_with(Vec::new).extend(extra);
                }
            }
            _ => {}
        }
    }
}

fn declare_variable(entry: &mut FileEntry, statement: Node<'_>, identifier: Node<'_>, source: &str) {
    let core = SymbolCore::new(
        &entry.id,
        node_text(identifier, source),
        Span::of(statement),
        Span::of(identifier),
    );
    insert(
        entry,
        Symbol::Variable {
            core,
            is_macro: false,
        },
    );
}

/// Repeated top-level names keep every defining node.
fn insert(entry: &mut FileEntry, symbol: Symbol) {
    match entry.symbols.get_mut(symbol.name()) {
        Some(existing) => {
            let nodes = &mut existing.core_mut().nodes;
            for span in symbol.nodes() {
                if !nodes.contains(span) {
                    nodes.push(*span);
                }
            }
        }
        None => {
            entry.symbols.insert(symbol.name().to_string(), symbol);
        }
    }
}

fn is_all_target(left: Node<'_>, source: &str) -> bool {
    left.kind() == "identifier" && node_text(left, source) == "__all__"
}

fn assigned_identifiers(left: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    let mut stack = vec![left];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "identifier" => out.push(node),
            "pattern_list" | "tuple_pattern" | "list_pattern" | "list_splat_pattern" => {
                let mut cursor = node.walk();
                let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
                stack.extend(children.into_iter().rev());
            }
            _ => {}
        }
    }
    out
}

fn string_list(node: Option<Node<'_>>, source: &str) -> Vec<String> {
    let Some(node) = node else {
        return Vec::new();
    };
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() == "string")
        .map(|child| string_value(child, source))
        .collect()
}

pub(crate) fn string_value(node: Node<'_>, source: &str) -> String {
    let mut cursor = node.walk();
    let content: String = node
        .named_children(&mut cursor)
        .filter(|child| child.kind() == "string_content")
        .map(|child| node_text(child, source))
        .collect();
    if !content.is_empty() {
        return content;
    }
    node_text(node, source)
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string()
}

/// Every import statement in the file, nested ones included.
pub(crate) fn collect_imports(root: Node<'_>, source: &str) -> Vec<ImportStatement> {
    let mut imports = Vec::new();
    for node in descendants(root) {
        match node.kind() {
            "import_statement" => {
                let mut cursor = node.walk();
                let members = node
                    .children_by_field_name("name", &mut cursor)
                    .filter_map(|name| import_member(name, source))
                    .collect();
                imports.push(ImportStatement::Module {
                    span: Span::of(node),
                    members,
                });
            }
            "import_from_statement" => {
                let Some(module) = node.child_by_field_name("module_name") else {
                    continue;
                };
                let module: String = node_text(module, source)
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                let mut cursor = node.walk();
                let members = node
                    .children_by_field_name("name", &mut cursor)
                    .filter_map(|name| import_member(name, source))
                    .collect();
                let mut cursor = node.walk();
                let wildcard = node
                    .children(&mut cursor)
                    .any(|child| child.kind() == "wildcard_import");
                imports.push(ImportStatement::From {
                    span: Span::of(node),
                    module,
                    members,
                    wildcard,
                });
            }
            _ => {}
        }
    }
    imports
}

fn import_member(node: Node<'_>, source: &str) -> Option<ImportMember> {
    match node.kind() {
        "dotted_name" => Some(ImportMember {
            name: node_text(node, source).to_string(),
            alias: None,
            span: Span::of(node),
        }),
        "aliased_import" => {
            let name = node.child_by_field_name("name")?;
            let alias = node.child_by_field_name("alias")?;
            Some(ImportMember {
                name: node_text(name, source).to_string(),
                alias: Some(node_text(alias, source).to_string()),
                span: Span::of(node),
            })
        }
        _ => None,
    }
}
