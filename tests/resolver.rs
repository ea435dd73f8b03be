use depslice::analysis::{Analysis, AnalysisOptions};
use depslice::model::Language;
use depslice::resolver::c::CIncludeResolver;
use depslice::resolver::python::PythonModuleResolver;
use depslice::resolver::{ModuleResolver, Resolution};
use depslice::source::{Project, ScanOptions};
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn python_resolver() -> PythonModuleResolver {
    PythonModuleResolver::new([
        "app.py",
        "shop/__init__.py",
        "shop/models.py",
        "shop/tools/__init__.py",
        "shop/tools.py",
        "shop/sub/deep.py",
        "plugins/extra/hook.py",
    ])
}

#[test]
fn file_module_beats_package_of_same_name() {
    let resolver = python_resolver();
    assert_eq!(
        resolver.resolve("app.py", "shop.tools"),
        Resolution::FileModule("shop/tools.py".to_string())
    );
}

#[test]
fn packages_and_namespaces_resolve() {
    let resolver = python_resolver();
    assert_eq!(
        resolver.resolve("app.py", "shop"),
        Resolution::PackageModule("shop/__init__.py".to_string())
    );
    assert_eq!(
        resolver.resolve("app.py", "plugins"),
        Resolution::NamespacePackageModule("plugins".to_string())
    );
    assert_eq!(
        resolver.resolve("app.py", "plugins.extra"),
        Resolution::NamespacePackageModule("plugins/extra".to_string())
    );
    assert_eq!(resolver.resolve("app.py", "plugins").file(), None);
}

#[test]
fn relative_imports_climb_one_package_per_extra_dot() {
    let resolver = python_resolver();
    assert_eq!(
        resolver.resolve("shop/models.py", ".tools"),
        Resolution::FileModule("shop/tools.py".to_string())
    );
    assert_eq!(
        resolver.resolve("shop/__init__.py", ".models"),
        Resolution::FileModule("shop/models.py".to_string())
    );
    assert_eq!(
        resolver.resolve("shop/sub/deep.py", "..models"),
        Resolution::FileModule("shop/models.py".to_string())
    );
    assert_eq!(
        resolver.resolve("shop/sub/deep.py", "."),
        Resolution::NamespacePackageModule("shop/sub".to_string())
    );
    assert_eq!(resolver.resolve("app.py", "...models"), Resolution::Unresolved);
}

#[test]
fn absolute_imports_resolve_from_nested_files() {
    let resolver = python_resolver();
    assert_eq!(
        resolver.resolve("shop/sub/deep.py", "shop.models"),
        Resolution::FileModule("shop/models.py".to_string())
    );
    assert_eq!(resolver.resolve("app.py", "flask"), Resolution::Unresolved);
}

#[test]
fn resolution_is_deterministic_and_cached() {
    let resolver = python_resolver();
    let first = resolver.resolve("app.py", "shop.models");
    let second = resolver.resolve("app.py", "shop.models");
    assert_eq!(first, second);
    assert_eq!(resolver.cache().misses(), 1);
    assert_eq!(resolver.cache().hits(), 1);

    let fresh = python_resolver();
    assert_eq!(fresh.resolve_uncached("app.py", "shop.models"), first);
}

#[test]
fn includes_search_own_dir_then_include_dirs_then_root() {
    let resolver = CIncludeResolver::new(
        ["src/main.c", "src/util.h", "include/api.h", "lib/deep/x.h"],
        &["include".to_string()],
    );
    assert_eq!(
        resolver.resolve("src/main.c", "util.h"),
        Resolution::FileModule("src/util.h".to_string())
    );
    assert_eq!(
        resolver.resolve("src/main.c", "api.h"),
        Resolution::FileModule("include/api.h".to_string())
    );
    assert_eq!(
        resolver.resolve("src/main.c", "../include/api.h"),
        Resolution::FileModule("include/api.h".to_string())
    );
    assert_eq!(
        resolver.resolve("src/main.c", "lib/deep/x.h"),
        Resolution::FileModule("lib/deep/x.h".to_string())
    );
    assert_eq!(resolver.resolve("src/main.c", "missing.h"), Resolution::Unresolved);
}

#[test]
fn include_graph_finds_shortest_chain() {
    let project = Project::load(
        &fixture_path("c_burgers"),
        Language::C,
        &ScanOptions::default(),
    )
    .unwrap();
    let analysis = Analysis::new(project, AnalysisOptions::default());
    let graph = analysis.include_graph().unwrap();

    assert_eq!(graph.direct("main.c").to_vec(), vec!["menu.h".to_string()]);
    assert_eq!(
        graph.transitive("main.c"),
        vec!["menu.h".to_string(), "burgers.h".to_string()]
    );
    assert_eq!(
        graph.find_inclusion_chain("main.c", "burgers.h"),
        Some(vec![
            "main.c".to_string(),
            "menu.h".to_string(),
            "burgers.h".to_string()
        ])
    );
    assert_eq!(graph.find_inclusion_chain("burgers.h", "main.c"), None);
    assert!(
        graph
            .system_includes("burgers.c")
            .is_some_and(|headers| headers.contains("stdlib.h"))
    );
}
