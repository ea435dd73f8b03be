use crate::diagnostics::Diagnostic;
use crate::error::EngineError;
use crate::manifest;
use crate::model::{Language, Manifest};
use crate::registry::Registry;
use crate::resolver::ModuleResolver;
use crate::resolver::c::{CIncludeResolver, IncludeGraph};
use crate::resolver::python::PythonModuleResolver;
use crate::source::Project;
use crate::usage::UsageResolver;
use crate::usage::c::CUsageResolver;
use crate::usage::python::{ItemResolver, PythonUsageResolver};

#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    /// Extra C include directories, relative to the project root.
    pub include_dirs: Vec<String>,
}

enum Engine {
    Python(PythonModuleResolver),
    C {
        resolver: CIncludeResolver,
        graph: IncludeGraph,
    },
}

/// Everything derived from a project for one run: the registry and the
/// language's resolvers. Built once, then shared read-only.
pub struct Analysis {
    project: Project,
    registry: Registry,
    engine: Engine,
    options: AnalysisOptions,
}

impl Analysis {
    pub fn new(project: Project, options: AnalysisOptions) -> Self {
        let registry = Registry::build(&project);
        let engine = match project.language {
            Language::Python => Engine::Python(PythonModuleResolver::new(project.ids())),
            Language::C => {
                let resolver = CIncludeResolver::new(project.ids(), &options.include_dirs);
                let graph = IncludeGraph::build(&registry, &resolver);
                Engine::C { resolver, graph }
            }
        };
        Self {
            project,
            registry,
            engine,
            options,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    pub fn language(&self) -> Language {
        self.project.language
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.registry.diagnostics()
    }

    pub fn module_resolver(&self) -> &dyn ModuleResolver {
        match &self.engine {
            Engine::Python(modules) => modules,
            Engine::C { resolver, .. } => resolver,
        }
    }

    pub fn python_modules(&self) -> Option<&PythonModuleResolver> {
        match &self.engine {
            Engine::Python(modules) => Some(modules),
            Engine::C { .. } => None,
        }
    }

    pub fn include_graph(&self) -> Option<&IncludeGraph> {
        match &self.engine {
            Engine::C { graph, .. } => Some(graph),
            Engine::Python(_) => None,
        }
    }

    pub fn item_resolver(&self) -> Option<ItemResolver<'_>> {
        self.python_modules()
            .map(|modules| ItemResolver::new(&self.registry, modules))
    }

    pub fn usage(&self) -> Box<dyn UsageResolver + '_> {
        match &self.engine {
            Engine::Python(modules) => Box::new(PythonUsageResolver::new(
                &self.project,
                &self.registry,
                modules,
            )),
            Engine::C { graph, .. } => {
                Box::new(CUsageResolver::new(&self.project, &self.registry, graph))
            }
        }
    }

    pub fn manifest(&self) -> Result<Manifest, EngineError> {
        manifest::build(self)
    }
}
