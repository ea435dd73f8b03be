use super::{Invocations, SkipSet, UsageResolver};
use crate::error::EngineError;
use crate::model::{Span, Symbol, SymbolKey};
use crate::registry::{ImportStatement, Registry};
use crate::resolver::python::PythonModuleResolver;
use crate::resolver::{ModuleResolver, Resolution};
use crate::source::{Project, SourceFile};
use crate::util::{node_for_span, node_text};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tree_sitter::Node;

/// Where an imported name ultimately comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedItem {
    /// A project symbol, with the modules it was re-exported through
    /// (outermost first).
    Symbol { key: SymbolKey, via: Vec<String> },
    Module(Resolution),
    External { module: String, item: Option<String> },
}

impl ResolvedItem {
    fn through(self, file: &str) -> Self {
        match self {
            ResolvedItem::Symbol { key, mut via } => {
                if key.file != file && !via.iter().any(|hop| hop == file) {
                    via.insert(0, file.to_string());
                }
                ResolvedItem::Symbol { key, via }
            }
            other => other,
        }
    }
}

type ItemCache = Mutex<HashMap<(String, String), Option<ResolvedItem>>>;

/// Follows definitions, imports, wildcard imports and submodules to find
/// what `name` means inside a module.
pub struct ItemResolver<'a> {
    registry: &'a Registry,
    modules: &'a PythonModuleResolver,
    cache: ItemCache,
}

impl<'a> ItemResolver<'a> {
    pub fn new(registry: &'a Registry, modules: &'a PythonModuleResolver) -> Self {
        Self {
            registry,
            modules,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn resolve_item(&self, module: &Resolution, name: &str) -> Option<ResolvedItem> {
        let key = (module.path()?.to_string(), name.to_string());
        if let Some(found) = self.lock().get(&key) {
            return found.clone();
        }
        let mut visited = HashSet::new();
        let found = self.resolve_in(module, name, &mut visited);
        self.lock().insert(key, found.clone());
        found
    }

    fn resolve_in(
        &self,
        module: &Resolution,
        name: &str,
        visited: &mut HashSet<(String, String)>,
    ) -> Option<ResolvedItem> {
        let path = module.path()?;
        if !visited.insert((path.to_string(), name.to_string())) {
            return None;
        }
        if let Some(entry) = module.file().and_then(|file| self.registry.file(file)) {
            let file = entry.id.as_str();
            if entry.symbols.contains_key(name) {
                return Some(ResolvedItem::Symbol {
                    key: SymbolKey::new(file, name),
                    via: Vec::new(),
                });
            }

            // The last explicit import binding `name` wins.
            let mut last = None;
            for statement in &entry.imports {
                match statement {
                    ImportStatement::From {
                        module: specifier,
                        members,
                        wildcard: false,
                        ..
                    } => {
                        for member in members.iter().filter(|m| m.bound_name() == name) {
                            let source = self.modules.resolve(file, specifier);
                            last = if source.is_resolved() {
                                self.resolve_in(&source, &member.name, visited)
                                    .map(|found| found.through(file))
                            } else {
                                Some(ResolvedItem::External {
                                    module: specifier.clone(),
                                    item: Some(member.name.clone()),
                                })
                            };
                        }
                    }
                    ImportStatement::Module { members, .. } => {
                        for member in members.iter().filter(|m| m.bound_name() == name) {
                            let source = self.modules.resolve(file, &member.name);
                            last = Some(if source.is_resolved() {
                                ResolvedItem::Module(source)
                            } else {
                                ResolvedItem::External {
                                    module: member.name.clone(),
                                    item: None,
                                }
                            });
                        }
                    }
                    _ => {}
                }
            }
            if last.is_some() {
                return last;
            }

            for statement in &entry.imports {
                let ImportStatement::From {
                    module: specifier,
                    wildcard: true,
                    ..
                } = statement
                else {
                    continue;
                };
                let source = self.modules.resolve(file, specifier);
                if !self.wildcard_exposes(&source, name) {
                    continue;
                }
                if let Some(found) = self.resolve_in(&source, name, visited) {
                    return Some(found.through(file));
                }
            }
        }
        self.modules.child(module, name).map(ResolvedItem::Module)
    }

    fn wildcard_exposes(&self, module: &Resolution, name: &str) -> bool {
        module
            .file()
            .and_then(|file| self.registry.file(file))
            .is_some_and(|entry| entry.is_wildcard_visible(name))
    }

    /// Names `from <module> import *` brings in.
    pub fn wildcard_names(&self, module: &Resolution) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut visited = HashSet::new();
        self.collect_wildcard(module, &mut out, &mut visited);
        out
    }

    fn collect_wildcard(
        &self,
        module: &Resolution,
        out: &mut BTreeSet<String>,
        visited: &mut HashSet<String>,
    ) {
        let Some(entry) = module.file().and_then(|file| self.registry.file(file)) else {
            return;
        };
        if !visited.insert(entry.id.clone()) {
            return;
        }
        if let Some(exports) = &entry.exports {
            out.extend(exports.iter().cloned());
            return;
        }
        let public = |name: &str| !name.starts_with('_') && !name.contains('.');
        out.extend(entry.symbols.keys().filter(|name| public(name)).cloned());
        for statement in &entry.imports {
            match statement {
                ImportStatement::From {
                    module: specifier,
                    wildcard: true,
                    ..
                } => {
                    let source = self.modules.resolve(&entry.id, specifier);
                    self.collect_wildcard(&source, out, visited);
                }
                other => out.extend(
                    other
                        .members()
                        .iter()
                        .map(|member| member.bound_name())
                        .filter(|name| public(name))
                        .map(str::to_string),
                ),
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Option<ResolvedItem>>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// What a name bound by an import refers to.
#[derive(Debug, Clone)]
enum Target {
    Symbol { key: SymbolKey, via: Vec<String> },
    Module(Resolution),
    External { module: String, item: Option<String> },
    /// The module resolved but the item did not.
    Missing { file: Option<String> },
}

impl From<Option<ResolvedItem>> for Target {
    fn from(found: Option<ResolvedItem>) -> Self {
        match found {
            Some(ResolvedItem::Symbol { key, via }) => Target::Symbol { key, via },
            Some(ResolvedItem::Module(resolution)) => Target::Module(resolution),
            Some(ResolvedItem::External { module, item }) => Target::External { module, item },
            None => Target::Missing { file: None },
        }
    }
}

/// Every name the file's imports bind, resolved once.
#[derive(Debug, Default)]
struct Bindings {
    names: HashMap<String, Target>,
}

#[derive(Debug, Default)]
struct Occurrences {
    identifiers: BTreeSet<String>,
    attributes: BTreeSet<String>,
}

pub struct PythonUsageResolver<'a> {
    project: &'a Project,
    registry: &'a Registry,
    modules: &'a PythonModuleResolver,
    items: ItemResolver<'a>,
    bindings: Mutex<HashMap<String, Arc<Bindings>>>,
}

impl<'a> PythonUsageResolver<'a> {
    pub fn new(
        project: &'a Project,
        registry: &'a Registry,
        modules: &'a PythonModuleResolver,
    ) -> Self {
        Self {
            project,
            registry,
            modules,
            items: ItemResolver::new(registry, modules),
            bindings: Mutex::new(HashMap::new()),
        }
    }

    fn source(&self, file: &str) -> Result<&'a SourceFile, EngineError> {
        self.project
            .file(file)
            .ok_or_else(|| EngineError::MissingFile(file.to_string()))
    }

    fn bindings(&self, file: &str) -> Result<Arc<Bindings>, EngineError> {
        if let Some(found) = self.lock_bindings().get(file) {
            return Ok(Arc::clone(found));
        }
        let built = Arc::new(self.build_bindings(file)?);
        self.lock_bindings()
            .insert(file.to_string(), Arc::clone(&built));
        Ok(built)
    }

    fn build_bindings(&self, file: &str) -> Result<Bindings, EngineError> {
        let entry = self.registry.require_file(file)?;
        let mut names: HashMap<String, Target> = HashMap::new();

        // Wildcards first, earliest wins; explicit imports then override.
        for statement in &entry.imports {
            if let ImportStatement::From {
                module,
                wildcard: true,
                ..
            } = statement
            {
                let source = self.modules.resolve(file, module);
                if !source.is_resolved() {
                    continue;
                }
                for name in self.items.wildcard_names(&source) {
                    if names.contains_key(&name) {
                        continue;
                    }
                    let target = self.item_target(&source, &name);
                    names.insert(name, target);
                }
            }
        }
        for statement in &entry.imports {
            match statement {
                ImportStatement::Module { members, .. } => {
                    for member in members {
                        let source = self.modules.resolve(file, &member.name);
                        let target = if source.is_resolved() {
                            Target::Module(source)
                        } else {
                            Target::External {
                                module: member.name.clone(),
                                item: None,
                            }
                        };
                        names.insert(member.bound_name().to_string(), target);
                    }
                }
                ImportStatement::From {
                    module,
                    members,
                    wildcard: false,
                    ..
                } => {
                    let source = self.modules.resolve(file, module);
                    for member in members {
                        let target = if source.is_resolved() {
                            self.item_target(&source, &member.name)
                        } else {
                            Target::External {
                                module: module.clone(),
                                item: Some(member.name.clone()),
                            }
                        };
                        names.insert(member.bound_name().to_string(), target);
                    }
                }
                _ => {}
            }
        }
        Ok(Bindings { names })
    }

    fn item_target(&self, source: &Resolution, name: &str) -> Target {
        match Target::from(self.items.resolve_item(source, name)) {
            Target::Missing { .. } => Target::Missing {
                file: source.file().map(str::to_string),
            },
            found => found,
        }
    }

    fn resolve_occurrences(
        &self,
        file: &str,
        occurrences: &Occurrences,
    ) -> Result<Invocations, EngineError> {
        let bindings = self.bindings(file)?;
        let entry = self.registry.require_file(file)?;
        let mut out = Invocations::default();

        for name in &occurrences.identifiers {
            if let Some(target) = bindings.names.get(name) {
                apply_target(target, &mut out);
                continue;
            }
            if entry.symbols.contains_key(name) {
                out.resolved.insert(SymbolKey::new(file, name.as_str()));
                continue;
            }
            out.unresolved.insert(name.clone());
        }

        for (bound, target) in &bindings.names {
            match target {
                Target::Module(resolution) => {
                    self.apply_module_uses(bound, resolution, occurrences, &mut out)
                }
                Target::External { module, item: None } => {
                    let (bare, rests) = module_uses(bound, occurrences);
                    if !bare && rests.is_empty() {
                        continue;
                    }
                    out.add_external(module, None);
                    for rest in rests {
                        let first = rest.split('.').next().unwrap_or(rest);
                        out.add_external(module, Some(first));
                    }
                }
                _ => {}
            }
        }
        Ok(out)
    }

    /// `m`, `m.sym`, `m.sub.sym` for a name bound to a module.
    fn apply_module_uses(
        &self,
        bound: &str,
        resolution: &Resolution,
        occurrences: &Occurrences,
        out: &mut Invocations,
    ) {
        let (bare, rests) = module_uses(bound, occurrences);
        if !bare && rests.is_empty() {
            return;
        }
        if let Some(file) = resolution.file() {
            out.modules.insert(file.to_string());
        }
        for rest in rests {
            let mut current = resolution.clone();
            for segment in rest.split('.') {
                match self.items.resolve_item(&current, segment) {
                    Some(ResolvedItem::Symbol { key, via }) => {
                        out.resolved.insert(key);
                        out.modules.extend(via);
                        break;
                    }
                    Some(ResolvedItem::Module(child)) => {
                        if let Some(file) = child.file() {
                            out.modules.insert(file.to_string());
                        }
                        current = child;
                    }
                    Some(ResolvedItem::External { module, item }) => {
                        out.add_external(&module, item.as_deref());
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    fn scan(
        &self,
        file: &str,
        roots: &[Span],
        skip: &SkipSet,
        own: Option<&str>,
    ) -> Result<Invocations, EngineError> {
        let source = self.source(file)?;
        let root = source.root();
        let nodes: Vec<Node<'_>> = roots
            .iter()
            .filter_map(|span| node_for_span(root, span))
            .collect();
        let occurrences = collect_occurrences(nodes, skip, own, &source.text);
        self.resolve_occurrences(file, &occurrences)
    }

    fn lock_bindings(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Bindings>>> {
        self.bindings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl UsageResolver for PythonUsageResolver<'_> {
    fn invocations_of(&self, symbol: &Symbol) -> Result<Invocations, EngineError> {
        let skip = SkipSet::none();
        self.scan(symbol.file(), symbol.nodes(), &skip, Some(symbol.name()))
    }

    fn invocations_in(&self, file: &str, span: &Span) -> Result<Invocations, EngineError> {
        let skip = SkipSet::none();
        self.scan(file, std::slice::from_ref(span), &skip, None)
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
        let root = Span::of(source.root());
        self.scan(file, &[root], &skip, None)
    }

    fn file_imports(&self, file: &str) -> Result<Invocations, EngineError> {
        let entry = self.registry.require_file(file)?;
        let bindings = self.bindings(file)?;
        let mut out = Invocations::default();
        for target in bindings.names.values() {
            match target {
                Target::Module(resolution) => {
                    if let Some(path) = resolution.file() {
                        out.modules.insert(path.to_string());
                    }
                }
                Target::External { module, item } => out.add_external(module, item.as_deref()),
                other => apply_target(other, &mut out),
            }
        }
        // A statement binding nothing usable still names its module.
        for statement in &entry.imports {
            if let ImportStatement::From { module, .. } = statement {
                let resolution = self.modules.resolve(file, module);
                match resolution.file() {
                    Some(path) => {
                        out.modules.insert(path.to_string());
                    }
                    None if !resolution.is_resolved() => out.add_external(module, None),
                    None => {}
                }
            }
        }
        Ok(out)
    }
}

fn apply_target(target: &Target, out: &mut Invocations) {
    match target {
        Target::Symbol { key, via } => {
            out.resolved.insert(key.clone());
            out.modules.extend(via.iter().cloned());
        }
        Target::External {
            module,
            item: Some(item),
        } => out.add_external(module, Some(item)),
        Target::Missing { file: Some(file) } => {
            out.modules.insert(file.clone());
        }
        // Module bindings are matched through attribute chains.
        Target::Module(_) | Target::External { item: None, .. } | Target::Missing { file: None } => {}
    }
}

/// Whether `bound` is used bare, and the attribute paths used after it.
fn module_uses<'o>(bound: &str, occurrences: &'o Occurrences) -> (bool, Vec<&'o str>) {
    let bare = occurrences.identifiers.contains(bound) || occurrences.attributes.contains(bound);
    let prefix = format!("{bound}.");
    let rests = occurrences
        .attributes
        .iter()
        .filter_map(|attribute| attribute.strip_prefix(prefix.as_str()))
        .collect();
    (bare, rests)
}

const IMPORT_KINDS: &[&str] = &[
    "import_statement",
    "import_from_statement",
    "future_import_statement",
];

fn collect_occurrences(
    roots: Vec<Node<'_>>,
    skip: &SkipSet,
    own: Option<&str>,
    source: &str,
) -> Occurrences {
    let mut occurrences = Occurrences::default();
    let mut stack = roots;
    while let Some(node) = stack.pop() {
        if skip.skips(node) || IMPORT_KINDS.contains(&node.kind()) {
            continue;
        }
        match node.kind() {
            "identifier" => {
                if is_reference(node) {
                    let text = node_text(node, source);
                    if Some(text) != own {
                        occurrences.identifiers.insert(text.to_string());
                    }
                }
            }
            "attribute" => {
                let text: String = node_text(node, source)
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                occurrences.attributes.insert(text);
            }
            _ => {}
        }
        let mut cursor = node.walk();
        stack.extend(node.children(&mut cursor));
    }
    occurrences
}

/// Filters identifiers that name things rather than refer to them.
fn is_reference(node: Node<'_>) -> bool {
    let Some(parent) = node.parent() else {
        return true;
    };
    let is_field = |field: &str| parent.child_by_field_name(field) == Some(node);
    match parent.kind() {
        "attribute" => !is_field("attribute"),
        "keyword_argument" | "default_parameter" | "typed_default_parameter" => !is_field("name"),
        "function_definition" | "class_definition" => !is_field("name"),
        "parameters" | "lambda_parameters" => false,
        "typed_parameter" => is_field("type"),
        _ => true,
    }
}
