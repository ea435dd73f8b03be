use super::{ModuleResolver, Resolution, ResolverCache};
use crate::registry::Registry;
use crate::util::{join_normalized, parent_dir};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Mutex;

/// Resolves quoted `#include` paths against the project's files.
#[derive(Debug)]
pub struct CIncludeResolver {
    files: BTreeSet<String>,
    include_dirs: Vec<String>,
    cache: ResolverCache,
}

impl CIncludeResolver {
    pub fn new<'a>(files: impl IntoIterator<Item = &'a str>, include_dirs: &[String]) -> Self {
        Self {
            files: files.into_iter().map(str::to_string).collect(),
            include_dirs: include_dirs
                .iter()
                .map(|dir| dir.trim_matches('/').to_string())
                .collect(),
            cache: ResolverCache::default(),
        }
    }

    fn candidate(&self, base: &str, specifier: &str) -> Option<String> {
        join_normalized(base, specifier).filter(|path| self.files.contains(path))
    }
}

impl ModuleResolver for CIncludeResolver {
    fn resolve_uncached(&self, current: &str, specifier: &str) -> Resolution {
        let specifier = specifier.trim();
        if specifier.is_empty() {
            return Resolution::Unresolved;
        }
        std::iter::once(parent_dir(current))
            .chain(self.include_dirs.iter().map(String::as_str))
            .chain(std::iter::once(""))
            .find_map(|base| self.candidate(base, specifier))
            .map(Resolution::FileModule)
            .unwrap_or(Resolution::Unresolved)
    }

    fn cache(&self) -> &ResolverCache {
        &self.cache
    }
}

/// Per-file include edges, with the transitive closure computed lazily.
#[derive(Debug, Default)]
pub struct IncludeGraph {
    direct: BTreeMap<String, Vec<String>>,
    system: BTreeMap<String, BTreeSet<String>>,
    unresolved: BTreeMap<String, BTreeSet<String>>,
    closure: Mutex<HashMap<String, Vec<String>>>,
}

impl IncludeGraph {
    pub fn build(registry: &Registry, resolver: &CIncludeResolver) -> Self {
        let mut graph = IncludeGraph::default();
        for entry in registry.files() {
            let mut direct = Vec::new();
            for include in &entry.includes {
                if include.system {
                    graph
                        .system
                        .entry(entry.id.clone())
                        .or_default()
                        .insert(include.path.clone());
                    continue;
                }
                match resolver.resolve(&entry.id, &include.path) {
                    Resolution::FileModule(target) => {
                        if !direct.contains(&target) {
                            direct.push(target);
                        }
                    }
                    _ => {
                        tracing::debug!(file = %entry.id, include = %include.path, "unresolved include");
                        graph
                            .unresolved
                            .entry(entry.id.clone())
                            .or_default()
                            .insert(include.path.clone());
                    }
                }
            }
            graph.direct.insert(entry.id.clone(), direct);
        }
        graph
    }

    pub fn direct(&self, file: &str) -> &[String] {
        self.direct.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn system_includes(&self, file: &str) -> Option<&BTreeSet<String>> {
        self.system.get(file)
    }

    pub fn unresolved_includes(&self, file: &str) -> Option<&BTreeSet<String>> {
        self.unresolved.get(file)
    }

    /// Every file reachable through includes, in depth-first order,
    /// excluding `file` itself. Cycles are cut by the visited set.
    pub fn transitive(&self, file: &str) -> Vec<String> {
        let mut cache = self
            .closure
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(found) = cache.get(file) {
            return found.clone();
        }
        let mut order = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(file);
        let mut stack: Vec<&str> = self.direct(file).iter().rev().map(String::as_str).collect();
        while let Some(next) = stack.pop() {
            if !visited.insert(next) {
                continue;
            }
            order.push(next.to_string());
            stack.extend(self.direct(next).iter().rev().map(String::as_str));
        }
        cache.insert(file.to_string(), order.clone());
        order
    }

    /// Shortest include path from `from` to `to`, both ends included.
    pub fn find_inclusion_chain(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![from.to_string()]);
        }
        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut queue: VecDeque<&str> = VecDeque::from([from]);
        let mut seen: HashSet<&str> = HashSet::from([from]);
        while let Some(current) = queue.pop_front() {
            for next in self.direct(current) {
                if !seen.insert(next.as_str()) {
                    continue;
                }
                parents.insert(next.as_str(), current);
                if next == to {
                    let mut chain = vec![to.to_string()];
                    let mut cursor = to;
                    while let Some(&parent) = parents.get(cursor) {
                        chain.push(parent.to_string());
                        cursor = parent;
                    }
                    chain.reverse();
                    return Some(chain);
                }
                queue.push_back(next.as_str());
            }
        }
        None
    }
}
