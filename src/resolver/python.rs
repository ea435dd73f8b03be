use super::{ModuleResolver, Resolution, ResolverCache};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModuleKind {
    Namespace,
    Package,
    File,
}

#[derive(Debug, Clone)]
pub struct ModuleNode {
    /// Dotted name; `""` is the project root.
    pub name: String,
    pub kind: ModuleKind,
    /// File id for files and packages, directory for namespaces (`.` at root).
    pub path: String,
    pub children: BTreeSet<String>,
}

impl ModuleNode {
    fn resolution(&self) -> Resolution {
        match self.kind {
            ModuleKind::File => Resolution::FileModule(self.path.clone()),
            ModuleKind::Package => Resolution::PackageModule(self.path.clone()),
            ModuleKind::Namespace => Resolution::NamespacePackageModule(self.path.clone()),
        }
    }
}

/// Python module tree derived from file ids.
#[derive(Debug)]
pub struct PythonModuleResolver {
    modules: BTreeMap<String, ModuleNode>,
    /// Dotted name of every file, including shadowed ones.
    file_modules: HashMap<String, String>,
    by_path: HashMap<String, String>,
    cache: ResolverCache,
}

impl PythonModuleResolver {
    pub fn new<'a>(files: impl IntoIterator<Item = &'a str>) -> Self {
        let mut resolver = Self {
            modules: BTreeMap::new(),
            file_modules: HashMap::new(),
            by_path: HashMap::new(),
            cache: ResolverCache::default(),
        };
        resolver.upsert("", ModuleKind::Namespace, ".");
        for id in files {
            let Some((dotted, kind)) = module_name(id) else {
                continue;
            };
            resolver.ensure_ancestors(&dotted);
            resolver.upsert(&dotted, kind, id);
            resolver.file_modules.insert(id.to_string(), dotted);
        }
        resolver.by_path = resolver
            .modules
            .values()
            .map(|module| (module.path.clone(), module.name.clone()))
            .collect();
        resolver
    }

    fn ensure_ancestors(&mut self, dotted: &str) {
        let parts: Vec<&str> = dotted.split('.').filter(|part| !part.is_empty()).collect();
        for depth in 1..parts.len() {
            let name = parts[..depth].join(".");
            let dir = parts[..depth].join("/");
            self.upsert(&name, ModuleKind::Namespace, &dir);
        }
    }

    /// Inserts or upgrades a module: file beats package beats namespace.
    fn upsert(&mut self, dotted: &str, kind: ModuleKind, path: &str) {
        match self.modules.get_mut(dotted) {
            Some(existing) if existing.kind >= kind => {}
            Some(existing) => {
                existing.kind = kind;
                existing.path = path.to_string();
            }
            None => {
                self.modules.insert(
                    dotted.to_string(),
                    ModuleNode {
                        name: dotted.to_string(),
                        kind,
                        path: path.to_string(),
                        children: BTreeSet::new(),
                    },
                );
                if !dotted.is_empty() {
                    let (parent, child) = match dotted.rfind('.') {
                        Some(idx) => (&dotted[..idx], &dotted[idx + 1..]),
                        None => ("", dotted),
                    };
                    if let Some(parent) = self.modules.get_mut(parent) {
                        parent.children.insert(child.to_string());
                    }
                }
            }
        }
    }

    /// The module a resolution points at.
    pub fn module_for(&self, resolution: &Resolution) -> Option<&ModuleNode> {
        let path = resolution.path()?;
        self.by_path
            .get(path)
            .and_then(|dotted| self.modules.get(dotted))
    }

    /// A direct submodule `name` of the resolved module.
    pub fn child(&self, resolution: &Resolution, name: &str) -> Option<Resolution> {
        let module = self.module_for(resolution)?;
        if !module.children.contains(name) {
            return None;
        }
        let dotted = if module.name.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", module.name, name)
        };
        self.modules.get(&dotted).map(ModuleNode::resolution)
    }

    /// Package a file's relative imports start from.
    fn base_package(&self, file: &str) -> Option<Vec<String>> {
        let dotted = self.file_modules.get(file)?;
        let mut parts: Vec<String> = dotted
            .split('.')
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        if !is_package_init(file) {
            parts.pop();
        }
        Some(parts)
    }

    fn lookup(&self, parts: &[String]) -> Resolution {
        self.modules
            .get(&parts.join("."))
            .map(ModuleNode::resolution)
            .unwrap_or(Resolution::Unresolved)
    }
}

impl ModuleResolver for PythonModuleResolver {
    fn resolve_uncached(&self, current: &str, specifier: &str) -> Resolution {
        let specifier = specifier.trim();
        if specifier.is_empty() {
            return Resolution::Unresolved;
        }
        let Some(mut base) = self.base_package(current) else {
            return Resolution::Unresolved;
        };

        let level = specifier.chars().take_while(|c| *c == '.').count();
        let remainder: Vec<String> = specifier[level..]
            .split('.')
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();

        if level > 0 {
            let strip = level - 1;
            if strip > base.len() {
                return Resolution::Unresolved;
            }
            base.truncate(base.len() - strip);
            base.extend(remainder);
            return self.lookup(&base);
        }

        loop {
            let mut candidate = base.clone();
            candidate.extend(remainder.iter().cloned());
            let found = self.lookup(&candidate);
            if found.is_resolved() {
                return found;
            }
            if base.pop().is_none() {
                return Resolution::Unresolved;
            }
        }
    }

    fn cache(&self) -> &ResolverCache {
        &self.cache
    }
}

fn is_package_init(file: &str) -> bool {
    matches!(
        file.rsplit('/').next(),
        Some("__init__.py") | Some("__init__.pyi")
    )
}

/// Dotted module name and kind for a Python file id.
fn module_name(id: &str) -> Option<(String, ModuleKind)> {
    let stem = id
        .strip_suffix(".py")
        .or_else(|| id.strip_suffix(".pyi"))?;
    let mut parts: Vec<&str> = stem.split('/').collect();
    if is_package_init(id) {
        parts.pop();
        Some((parts.join("."), ModuleKind::Package))
    } else {
        Some((parts.join("."), ModuleKind::File))
    }
}
