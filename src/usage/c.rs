use super::{Invocations, SkipSet, UsageResolver};
use crate::error::EngineError;
use crate::model::{Language, Span, Symbol, SymbolKey};
use crate::registry::Registry;
use crate::resolver::c::IncludeGraph;
use crate::source::{Project, SourceFile, new_parser};
use crate::util::{node_for_span, node_text};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tree_sitter::Node;

/// A name visible through the include closure.
#[derive(Debug, Clone)]
struct Visible {
    key: SymbolKey,
    /// The name is an enum member and `key` is its enum.
    member: bool,
}

type VisibleMap = HashMap<String, Visible>;

pub struct CUsageResolver<'a> {
    project: &'a Project,
    registry: &'a Registry,
    graph: &'a IncludeGraph,
    visible: Mutex<HashMap<String, Arc<VisibleMap>>>,
}

impl<'a> CUsageResolver<'a> {
    pub fn new(project: &'a Project, registry: &'a Registry, graph: &'a IncludeGraph) -> Self {
        Self {
            project,
            registry,
            graph,
            visible: Mutex::new(HashMap::new()),
        }
    }

    fn source(&self, file: &str) -> Result<&'a SourceFile, EngineError> {
        self.project
            .file(file)
            .ok_or_else(|| EngineError::MissingFile(file.to_string()))
    }

    /// Names declared by every transitively included file.
    fn visible(&self, file: &str) -> Arc<VisibleMap> {
        let mut cache = self
            .visible
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(found) = cache.get(file) {
            return Arc::clone(found);
        }
        let mut names = VisibleMap::new();
        for included in self.graph.transitive(file) {
            let Some(entry) = self.registry.file(&included) else {
                continue;
            };
            for (member, owner) in &entry.enum_members {
                names.insert(
                    member.clone(),
                    Visible {
                        key: SymbolKey::new(included.as_str(), owner.as_str()),
                        member: true,
                    },
                );
            }
            for name in entry.symbols.keys() {
                names.insert(
                    name.clone(),
                    Visible {
                        key: SymbolKey::new(included.as_str(), name.as_str()),
                        member: false,
                    },
                );
            }
        }
        let names = Arc::new(names);
        cache.insert(file.to_string(), Arc::clone(&names));
        names
    }

    fn scan(
        &self,
        file: &str,
        roots: &[Span],
        skip: &SkipSet,
        own: Option<&SymbolKey>,
    ) -> Result<Invocations, EngineError> {
        let source = self.source(file)?;
        let root = source.root();
        let nodes: Vec<Node<'_>> = roots
            .iter()
            .filter_map(|span| node_for_span(root, span))
            .collect();

        let mut names = BTreeSet::new();
        let mut bodies = Vec::new();
        collect_names(nodes, skip, &source.text, &mut names, &mut bodies);

        // Macro bodies are opaque to the grammar; parse them as fragments.
        if !bodies.is_empty() {
            let mut parser = new_parser(Language::C)?;
            while let Some(body) = bodies.pop() {
                let Some(tree) = parser.parse(&body, None) else {
                    continue;
                };
                let mut nested = Vec::new();
                collect_names(
                    vec![tree.root_node()],
                    &SkipSet::none(),
                    &body,
                    &mut names,
                    &mut nested,
                );
                bodies.extend(nested);
            }
        }

        if let Some(own) = own {
            names.remove(&own.name);
        }
        self.resolve_names(file, &names, own)
    }

    fn resolve_names(
        &self,
        file: &str,
        names: &BTreeSet<String>,
        own: Option<&SymbolKey>,
    ) -> Result<Invocations, EngineError> {
        let entry = self.registry.require_file(file)?;
        let visible = self.visible(file);
        let mut out = Invocations::default();
        for name in names {
            let (key, member) = if let Some(found) = visible.get(name) {
                (found.key.clone(), found.member)
            } else if entry.symbols.contains_key(name) {
                (SymbolKey::new(file, name.as_str()), false)
            } else if let Some(owner) = entry.enum_members.get(name) {
                (SymbolKey::new(file, owner.as_str()), true)
            } else {
                out.unresolved.insert(name.clone());
                continue;
            };
            if member && own == Some(&key) {
                continue;
            }
            out.resolved.insert(key);
        }
        Ok(out)
    }
}

impl UsageResolver for CUsageResolver<'_> {
    fn invocations_of(&self, symbol: &Symbol) -> Result<Invocations, EngineError> {
        let own = symbol.key();
        let mut out = self.scan(symbol.file(), symbol.nodes(), &SkipSet::none(), Some(&own))?;
        match symbol {
            Symbol::Function {
                counterpart: Some(other),
                ..
            } => {
                out.resolved.insert(other.clone());
            }
            Symbol::DataType { typedefs, .. } => {
                out.resolved.extend(typedefs.iter().cloned());
            }
            Symbol::Typedef {
                datatype: Some(datatype),
                ..
            } => {
                out.resolved.insert(datatype.clone());
            }
            _ => {}
        }
        out.resolved.remove(&own);
        Ok(out)
    }

    fn invocations_in(&self, file: &str, span: &Span) -> Result<Invocations, EngineError> {
        self.scan(file, std::slice::from_ref(span), &SkipSet::none(), None)
    }

    fn module_level(&self, file: &str, skip: &[Span]) -> Result<Invocations, EngineError> {
        let entry = self.registry.require_file(file)?;
        let source = self.source(file)?;
        let skip = SkipSet::new(
            entry
                .symbols
                .values()
                .flat_map(|symbol| symbol.nodes().iter())
                .chain(skip.iter()),
        );
        self.scan(file, &[Span::of(source.root())], &skip, None)
    }

    fn file_imports(&self, file: &str) -> Result<Invocations, EngineError> {
        let mut out = Invocations::default();
        out.modules.extend(self.graph.direct(file).iter().cloned());
        let headers = self
            .graph
            .system_includes(file)
            .into_iter()
            .chain(self.graph.unresolved_includes(file))
            .flatten();
        for header in headers {
            out.add_external(header, None);
        }
        Ok(out)
    }
}

fn collect_names(
    roots: Vec<Node<'_>>,
    skip: &SkipSet,
    source: &str,
    names: &mut BTreeSet<String>,
    bodies: &mut Vec<String>,
) {
    let mut stack = roots;
    while let Some(node) = stack.pop() {
        if skip.skips(node) || node.kind() == "preproc_include" {
            continue;
        }
        match node.kind() {
            "identifier" | "type_identifier" => {
                let is_parameter = node
                    .parent()
                    .is_some_and(|parent| parent.kind() == "preproc_params");
                if !is_parameter {
                    names.insert(node_text(node, source).to_string());
                }
            }
            "preproc_arg" => {
                let body = node_text(node, source).trim();
                if !body.is_empty() {
                    bodies.push(body.to_string());
                }
            }
            _ => {}
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }
}
