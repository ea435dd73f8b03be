//! What a symbol (or a file's module-level code) refers to.

pub mod c;
pub mod python;

use crate::error::EngineError;
use crate::model::{DependencyEdge, Span, Symbol, SymbolKey};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tree_sitter::Node;

/// References found in a scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocations {
    /// Project symbols referenced.
    pub resolved: BTreeSet<SymbolKey>,
    /// Project files depended on without naming one of their symbols:
    /// re-export hops and bare module references.
    pub modules: BTreeSet<String>,
    /// External module or header to the item names used from it.
    pub external: BTreeMap<String, BTreeSet<String>>,
    pub unresolved: BTreeSet<String>,
}

impl Invocations {
    pub fn merge(&mut self, other: Invocations) {
        self.resolved.extend(other.resolved);
        self.modules.extend(other.modules);
        for (module, items) in other.external {
            self.external.entry(module).or_default().extend(items);
        }
        self.unresolved.extend(other.unresolved);
    }

    pub fn add_external(&mut self, module: &str, item: Option<&str>) {
        let items = self.external.entry(module.to_string()).or_default();
        if let Some(item) = item {
            items.insert(item.to_string());
        }
    }

    /// Dependency edges keyed by target id.
    pub fn edges(&self) -> BTreeMap<String, DependencyEdge> {
        let mut edges: BTreeMap<String, DependencyEdge> = BTreeMap::new();
        for key in &self.resolved {
            edges
                .entry(key.file.clone())
                .or_insert_with(|| DependencyEdge::new(&key.file, false))
                .add_symbol(&key.name);
        }
        for module in &self.modules {
            edges
                .entry(module.clone())
                .or_insert_with(|| DependencyEdge::new(module, false));
        }
        for (module, items) in &self.external {
            let edge = edges
                .entry(module.clone())
                .or_insert_with(|| DependencyEdge::new(module, true));
            for item in items {
                edge.add_symbol(item);
            }
        }
        edges
    }
}

/// Language-specific reference resolution over a built registry.
pub trait UsageResolver: Sync {
    fn invocations_of(&self, symbol: &Symbol) -> Result<Invocations, EngineError>;

    /// References made inside the node covering `span` in `file`.
    fn invocations_in(&self, file: &str, span: &Span) -> Result<Invocations, EngineError>;

    /// References made by code outside every symbol and import of `file`,
    /// also skipping the nodes in `skip`.
    fn module_level(&self, file: &str, skip: &[Span]) -> Result<Invocations, EngineError>;

    /// What the file's import or include statements bring in, whether or
    /// not anything refers to it.
    fn file_imports(&self, file: &str) -> Result<Invocations, EngineError>;
}

/// Exact node extents a scan must not enter.
pub(crate) struct SkipSet(HashSet<(usize, usize)>);

impl SkipSet {
    pub fn new<'a>(spans: impl IntoIterator<Item = &'a Span>) -> Self {
        Self(
            spans
                .into_iter()
                .map(|span| (span.start_byte, span.end_byte))
                .collect(),
        )
    }

    pub fn none() -> Self {
        Self(HashSet::new())
    }

    pub fn skips(&self, node: Node<'_>) -> bool {
        self.0.contains(&(node.start_byte(), node.end_byte()))
    }
}
