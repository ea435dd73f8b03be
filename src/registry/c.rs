use super::{Extracted, FileEntry, IncludeDirective};
use crate::diagnostics::{Diagnostic, Severity, syntax_errors};
use crate::model::{DataTypeKind, FunctionRole, Language, Span, Symbol, SymbolCore, SymbolKey};
use crate::source::SourceFile;
use crate::util::{descendants, node_text};
use std::collections::{BTreeMap, BTreeSet};
use tree_sitter::Node;

/// Nodes whose direct children may be top-level declarations.
const CONTAINERS: &[&str] = &[
    "translation_unit",
    "preproc_ifdef",
    "preproc_if",
    "preproc_else",
    "preproc_elif",
    "preproc_elifdef",
];

const DECLARATION_KINDS: &[&str] = &[
    "declaration",
    "function_definition",
    "struct_specifier",
    "enum_specifier",
    "union_specifier",
    "type_definition",
    "preproc_def",
    "preproc_function_def",
];

/// Top-level declaration nodes in source order, looking through
/// conditional-compilation blocks.
pub fn top_level_items(root: Node<'_>) -> Vec<Node<'_>> {
    collect_top_level(root, DECLARATION_KINDS)
}

fn collect_top_level<'tree>(root: Node<'tree>, kinds: &[&str]) -> Vec<Node<'tree>> {
    let mut items = Vec::new();
    let mut stack = vec![root];
    while let Some(container) = stack.pop() {
        let mut cursor = container.walk();
        for child in container.named_children(&mut cursor) {
            if CONTAINERS.contains(&child.kind()) {
                stack.push(child);
            } else if kinds.contains(&child.kind()) {
                items.push(child);
            }
        }
    }
    items.sort_by_key(|node| node.start_byte());
    items
}

pub(crate) fn include_directives(root: Node<'_>, source: &str) -> Vec<IncludeDirective> {
    collect_top_level(root, &["preproc_include"])
        .into_iter()
        .filter_map(|node| {
            let path = node.child_by_field_name("path")?;
            let raw = node_text(path, source).trim();
            let system = path.kind() == "system_lib_string";
            let cleaned = if system {
                raw.trim_start_matches('<').trim_end_matches('>')
            } else {
                raw.trim_matches('"')
            };
            Some(IncludeDirective {
                path: cleaned.to_string(),
                system,
                span: Span::of(node),
            })
        })
        .collect()
}

struct Builder<'a> {
    source: &'a str,
    entry: FileEntry,
    diagnostics: Vec<Diagnostic>,
    typedef_targets: Vec<(String, String)>,
}

pub(crate) fn extract(file: &SourceFile) -> Extracted {
    let source = file.text.as_str();
    let root = file.root();
    let mut builder = Builder {
        source,
        entry: FileEntry::new(&file.id, Language::C),
        diagnostics: syntax_errors(&file.id, root, source),
        typedef_targets: Vec::new(),
    };
    for item in top_level_items(root) {
        builder.declare(item);
    }
    builder.entry.includes = include_directives(root, source);
    builder.entry.conditionals = conditional_names(root, source);
    Extracted {
        entry: builder.entry,
        diagnostics: builder.diagnostics,
        typedef_targets: builder.typedef_targets,
    }
}

impl<'a> Builder<'a> {
    fn declare(&mut self, node: Node<'_>) {
        match node.kind() {
            "declaration" => self.declare_declaration(node),
            "function_definition" => self.declare_function_definition(node),
            "struct_specifier" | "enum_specifier" | "union_specifier" => {
                self.declare_datatype(node, None);
            }
            "type_definition" => self.declare_typedef(node),
            "preproc_def" => self.declare_macro(node, false),
            "preproc_function_def" => self.declare_macro(node, true),
            _ => {}
        }
    }

    fn declare_declaration(&mut self, node: Node<'_>) {
        if let Some(ty) = node.child_by_field_name("type") {
            if is_datatype_specifier(ty) && ty.child_by_field_name("body").is_some() {
                self.declare_datatype(ty, None);
            }
        }
        let mut cursor = node.walk();
        let declarators: Vec<Node<'_>> = node
            .children_by_field_name("declarator", &mut cursor)
            .collect();
        for declarator in declarators {
            let Some((identifier, holder)) = find_identifier(declarator) else {
                continue;
            };
            let core = self.core(node, identifier);
            let symbol = if holder.kind() == "function_declarator" {
                Symbol::Function {
                    core,
                    role: FunctionRole::Signature,
                    is_macro: false,
                    counterpart: None,
                }
            } else {
                Symbol::Variable {
                    core,
                    is_macro: false,
                }
            };
            self.insert(symbol);
        }
    }

    fn declare_function_definition(&mut self, node: Node<'_>) {
        let Some((identifier, _)) = node
            .child_by_field_name("declarator")
            .and_then(find_identifier)
        else {
            return;
        };
        let core = self.core(node, identifier);
        self.insert(Symbol::Function {
            core,
            role: FunctionRole::Definition,
            is_macro: false,
            counterpart: None,
        });
    }

    /// Declares a struct, enum or union. `owner` names an enclosing typedef
    /// for anonymous bodies.
    fn declare_datatype(&mut self, node: Node<'_>, owner: Option<&str>) {
        let kind = match node.kind() {
            "struct_specifier" => DataTypeKind::Struct,
            "enum_specifier" => DataTypeKind::Enum,
            _ => DataTypeKind::Union,
        };
        let body = node.child_by_field_name("body");
        let Some(name_node) = node.child_by_field_name("name") else {
            match owner {
                Some(owner) => {
                    let owner = owner.to_string();
                    self.record_members(body, &owner);
                }
                None if body.is_some() => self.diagnostics.push(
                    Diagnostic::new(
                        &self.entry.id,
                        Severity::Warning,
                        "anonymous-datatype",
                        format!("anonymous {} cannot be referenced", node.kind()),
                    )
                    .at(&Span::of(node), self.source),
                ),
                None => {}
            }
            return;
        };
        let name = node_text(name_node, self.source).to_string();
        if body.is_none() && self.entry.symbols.contains_key(&name) {
            // Forward declaration of something already known.
            return;
        }
        self.record_members(body, &name);
        let core = self.core(node, name_node);
        self.insert(Symbol::DataType {
            core,
            kind,
            typedefs: BTreeSet::new(),
        });
    }

    fn record_members(&mut self, body: Option<Node<'_>>, owner: &str) {
        let Some(body) = body.filter(|body| body.kind() == "enumerator_list") else {
            return;
        };
        let mut cursor = body.walk();
        for enumerator in body.named_children(&mut cursor) {
            if enumerator.kind() != "enumerator" {
                continue;
            }
            if let Some(name) = enumerator.child_by_field_name("name") {
                self.entry
                    .enum_members
                    .insert(node_text(name, self.source).to_string(), owner.to_string());
            }
        }
    }

    fn declare_typedef(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        let names: Vec<Node<'_>> = node
            .children_by_field_name("declarator", &mut cursor)
            .filter_map(|declarator| find_identifier(declarator).map(|(ident, _)| ident))
            .collect();
        let first_name = names
            .first()
            .map(|ident| node_text(*ident, self.source).to_string());

        let mut target = None;
        if let Some(ty) = node.child_by_field_name("type") {
            if is_datatype_specifier(ty) {
                if ty.child_by_field_name("body").is_some() {
                    self.declare_datatype(ty, first_name.as_deref());
                }
                target = ty
                    .child_by_field_name("name")
                    .map(|name| node_text(name, self.source).to_string());
            } else if ty.kind() == "type_identifier" {
                target = Some(node_text(ty, self.source).to_string());
            }
        }

        for ident in names {
            let name = node_text(ident, self.source).to_string();
            if let Some(target) = &target {
                if *target != name {
                    self.typedef_targets.push((name.clone(), target.clone()));
                }
            }
            let core = self.core(node, ident);
            self.insert(Symbol::Typedef {
                core,
                datatype: None,
            });
        }
    }

    fn declare_macro(&mut self, node: Node<'_>, function_like: bool) {
        let Some(name) = node.child_by_field_name("name") else {
            return;
        };
        let core = self.core(node, name);
        let symbol = if function_like {
            Symbol::Function {
                core,
                role: FunctionRole::Definition,
                is_macro: true,
                counterpart: None,
            }
        } else {
            Symbol::Variable {
                core,
                is_macro: true,
            }
        };
        self.insert(symbol);
    }

    fn core(&self, node: Node<'_>, identifier: Node<'_>) -> SymbolCore {
        SymbolCore::new(
            &self.entry.id,
            node_text(identifier, self.source),
            Span::of(node),
            Span::of(identifier),
        )
    }

    fn insert(&mut self, symbol: Symbol) {
        let name = symbol.name().to_string();
        let merged = match self.entry.symbols.remove(&name) {
            Some(existing) => merge(existing, symbol),
            None => symbol,
        };
        self.entry.symbols.insert(name, merged);
    }
}

/// Same-name merge rules within one file: a typedef absorbs its datatype,
/// function declarations and definitions combine, anything else is replaced.
fn merge(existing: Symbol, incoming: Symbol) -> Symbol {
    match (existing, incoming) {
        (Symbol::Typedef { mut core, datatype }, Symbol::DataType { core: other, .. })
        | (Symbol::DataType { core: other, .. }, Symbol::Typedef { mut core, datatype }) => {
            absorb(&mut core, &other.nodes);
            Symbol::Typedef { core, datatype }
        }
        (
            Symbol::Function {
                core: mut first,
                role: first_role,
                is_macro: false,
                ..
            },
            Symbol::Function {
                core: second,
                role: second_role,
                is_macro: false,
                ..
            },
        ) => {
            let role = if first_role == FunctionRole::Definition
                || second_role == FunctionRole::Definition
            {
                FunctionRole::Definition
            } else {
                FunctionRole::Signature
            };
            if second_role == FunctionRole::Definition {
                first.identifier = second.identifier;
            }
            absorb(&mut first, &second.nodes);
            Symbol::Function {
                core: first,
                role,
                is_macro: false,
                counterpart: None,
            }
        }
        (_, incoming) => incoming,
    }
}

/// Adds spans that are not already covered, dropping ones the new spans cover.
fn absorb(core: &mut SymbolCore, spans: &[Span]) {
    for span in spans {
        if core.nodes.iter().any(|node| node.contains(span)) {
            continue;
        }
        core.nodes.retain(|node| !span.contains(node));
        core.nodes.push(*span);
    }
    core.nodes.sort();
}

/// Descends `declarator` fields (or the first named child) to the declared
/// name. Returns the name and the node directly holding it.
pub(crate) fn find_identifier(node: Node<'_>) -> Option<(Node<'_>, Node<'_>)> {
    let mut current = node;
    let mut holder = node;
    for _ in 0..64 {
        if matches!(
            current.kind(),
            "identifier" | "type_identifier" | "field_identifier"
        ) {
            return Some((current, holder));
        }
        let next = current
            .child_by_field_name("declarator")
            .or_else(|| current.named_child(0))?;
        holder = current;
        current = next;
    }
    None
}

fn is_datatype_specifier(node: Node<'_>) -> bool {
    matches!(
        node.kind(),
        "struct_specifier" | "enum_specifier" | "union_specifier"
    )
}

/// Macro names tested by `#ifdef`, `#ifndef`, `#elifdef` or inside an `#if` /
/// `#elif` condition, include guards among them.
fn conditional_names(root: Node<'_>, source: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for node in descendants(root) {
        match node.kind() {
            "preproc_ifdef" | "preproc_elifdef" => {
                if let Some(name) = node.child_by_field_name("name") {
                    names.insert(node_text(name, source).to_string());
                }
            }
            "preproc_if" | "preproc_elif" => {
                let Some(condition) = node.child_by_field_name("condition") else {
                    continue;
                };
                names.extend(
                    descendants(condition)
                        .into_iter()
                        .filter(|child| child.kind() == "identifier")
                        .map(|child| node_text(child, source).to_string()),
                );
            }
            _ => {}
        }
    }
    names
}

/// Cross-file links: typedefs to the datatypes they name, and source-file
/// function definitions to header signatures.
pub(crate) fn link(
    files: &mut BTreeMap<String, FileEntry>,
    typedef_targets: &[(String, String, String)],
) {
    for (file, typedef, target) in typedef_targets {
        let Some(datatype) = find_datatype(files, file, target) else {
            continue;
        };
        let typedef_key = SymbolKey::new(file.as_str(), typedef.as_str());
        if datatype == typedef_key {
            continue;
        }
        if let Some(Symbol::Typedef { datatype: link, .. }) = files
            .get_mut(file)
            .and_then(|entry| entry.symbols.get_mut(typedef))
        {
            *link = Some(datatype.clone());
        }
        if let Some(Symbol::DataType { typedefs, .. }) = files
            .get_mut(&datatype.file)
            .and_then(|entry| entry.symbols.get_mut(&datatype.name))
        {
            typedefs.insert(typedef_key);
        }
    }

    let mut signatures: BTreeMap<String, SymbolKey> = BTreeMap::new();
    for entry in files.values().filter(|entry| entry.is_header()) {
        for symbol in entry.symbols.values() {
            if let Symbol::Function {
                role: FunctionRole::Signature,
                is_macro: false,
                ..
            } = symbol
            {
                signatures
                    .entry(symbol.name().to_string())
                    .or_insert_with(|| symbol.key());
            }
        }
    }
    let mut pairs = Vec::new();
    for entry in files.values().filter(|entry| !entry.is_header()) {
        for symbol in entry.symbols.values() {
            if let Symbol::Function {
                role: FunctionRole::Definition,
                is_macro: false,
                ..
            } = symbol
            {
                if let Some(signature) = signatures.get(symbol.name()) {
                    pairs.push((signature.clone(), symbol.key()));
                }
            }
        }
    }
    for (signature, definition) in pairs {
        set_counterpart(files, &signature, &definition);
        set_counterpart(files, &definition, &signature);
    }
}

fn find_datatype(
    files: &BTreeMap<String, FileEntry>,
    file: &str,
    name: &str,
) -> Option<SymbolKey> {
    let is_datatype = |entry: &FileEntry| {
        matches!(entry.symbols.get(name), Some(Symbol::DataType { .. }))
    };
    if files.get(file).is_some_and(is_datatype) {
        return Some(SymbolKey::new(file, name));
    }
    files
        .values()
        .filter(|entry| entry.is_header())
        .chain(files.values().filter(|entry| !entry.is_header()))
        .find(|entry| is_datatype(entry))
        .map(|entry| SymbolKey::new(entry.id.as_str(), name))
}

fn set_counterpart(files: &mut BTreeMap<String, FileEntry>, key: &SymbolKey, other: &SymbolKey) {
    if let Some(Symbol::Function { counterpart, .. }) = files
        .get_mut(&key.file)
        .and_then(|entry| entry.symbols.get_mut(&key.name))
    {
        *counterpart = Some(other.clone());
    }
}
