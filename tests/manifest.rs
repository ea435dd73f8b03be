use depslice::analysis::{Analysis, AnalysisOptions};
use depslice::model::{Language, Manifest, SymbolKind};
use depslice::source::{Project, ScanOptions};
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn analyze(name: &str, language: Language) -> (Analysis, Manifest) {
    let project = Project::load(&fixture_path(name), language, &ScanOptions::default()).unwrap();
    let analysis = Analysis::new(project, AnalysisOptions::default());
    let manifest = analysis.manifest().unwrap();
    (analysis, manifest)
}

fn in_memory(language: Language, sources: &[(&str, &str)]) -> Manifest {
    let project = Project::from_sources(language, sources.iter().copied()).unwrap();
    Analysis::new(project, AnalysisOptions::default())
        .manifest()
        .unwrap()
}

/// Every internal dependency has its mirror in the target's dependents,
/// and the counts match the maps.
fn assert_symmetric(manifest: &Manifest) {
    for (file_id, file) in &manifest.files {
        assert_eq!(file.metrics.dependency_count, file.dependencies.len());
        assert_eq!(file.metrics.dependent_count, file.dependents.len());
        for edge in file.dependencies.values().filter(|edge| !edge.is_external) {
            let target = manifest.file(&edge.id).unwrap();
            assert!(
                target.dependents.contains_key(file_id),
                "{} should list {file_id} as dependent",
                edge.id
            );
        }
        for (symbol_id, symbol) in &file.symbols {
            assert_eq!(symbol.metrics.dependency_count, symbol.dependencies.len());
            assert_eq!(symbol.metrics.dependent_count, symbol.dependents.len());
            for edge in symbol.dependencies.values().filter(|edge| !edge.is_external) {
                for used in edge.symbols.keys() {
                    let dependents = &manifest.file(&edge.id).unwrap().symbols[used].dependents;
                    assert!(
                        dependents
                            .get(file_id)
                            .is_some_and(|record| record.symbols.contains_key(symbol_id)),
                        "{}:{used} should list {file_id}:{symbol_id}",
                        edge.id
                    );
                }
            }
        }
    }
}

#[test]
fn python_manifest_is_symmetric() {
    let (_, manifest) = analyze("py_shop", Language::Python);
    assert_symmetric(&manifest);
    assert_eq!(manifest.files.len(), 9);
}

#[test]
fn c_manifest_is_symmetric() {
    let (_, manifest) = analyze("c_burgers", Language::C);
    assert_symmetric(&manifest);
}

#[test]
fn reexport_hop_is_a_symbolless_dependency() {
    let (_, manifest) = analyze("py_shop", Language::Python);
    let checkout = &manifest.file("app.py").unwrap().symbols["checkout"];

    let models = &checkout.dependencies["shop/models.py"];
    assert!(!models.is_external);
    assert!(models.symbols.contains_key("Item"));
    let hop = &checkout.dependencies["shop/__init__.py"];
    assert!(hop.symbols.is_empty());

    assert!(checkout.dependencies["shop/pricing.py"].symbols.contains_key("price"));
    assert!(checkout.dependencies["shop/helpers.py"].symbols.contains_key("fmt"));
}

#[test]
fn direct_importer_does_not_list_the_reexporter() {
    let (_, manifest) = analyze("py_shop", Language::Python);
    let pricing = manifest.file("shop/pricing.py").unwrap();
    assert!(!pricing.dependencies.contains_key("shop/__init__.py"));
    let price = &pricing.symbols["price"];
    assert!(price.dependencies["shop/models.py"].symbols.contains_key("Item"));
    assert!(!price.dependencies.contains_key("shop/__init__.py"));
}

#[test]
fn reexport_scenario_from_scratch() {
    let manifest = in_memory(
        Language::Python,
        &[
            ("original.py", "def f():\n    return 1\n"),
            ("reexporter.py", "from original import f\n"),
            ("consumer.py", "from reexporter import f\n\n\ndef use():\n    return f()\n"),
            ("direct.py", "from original import f\n\n\ndef use():\n    return f()\n"),
        ],
    );
    let consumer = manifest.file("consumer.py").unwrap();
    assert!(consumer.dependencies["original.py"].symbols.contains_key("f"));
    assert!(consumer.dependencies["reexporter.py"].symbols.is_empty());

    let direct = manifest.file("direct.py").unwrap();
    assert!(direct.dependencies.contains_key("original.py"));
    assert!(!direct.dependencies.contains_key("reexporter.py"));

    // The conduit itself depends on the definition.
    let reexporter = manifest.file("reexporter.py").unwrap();
    assert!(reexporter.dependencies["original.py"].symbols.contains_key("f"));
    assert!(reexporter.symbols.is_empty());
    assert_symmetric(&manifest);
}

#[test]
fn wildcard_import_respects_all() {
    let (_, manifest) = analyze("py_shop", Language::Python);
    let app = manifest.file("app.py").unwrap();
    let helpers = &app.dependencies["shop/helpers.py"];
    assert!(helpers.symbols.contains_key("fmt"));
    assert!(!helpers.symbols.contains_key("hidden"));
}

#[test]
fn file_module_wins_over_package_in_usage() {
    let (_, manifest) = analyze("py_shop", Language::Python);
    let sharpen_all = &manifest.file("app.py").unwrap().symbols["sharpen_all"];
    assert!(sharpen_all.dependencies["shop/tools.py"].symbols.contains_key("sharpen"));
    assert!(!sharpen_all.dependencies.contains_key("shop/tools/__init__.py"));
}

#[test]
fn external_modules_are_flagged() {
    let (_, manifest) = analyze("py_shop", Language::Python);
    let app = manifest.file("app.py").unwrap();
    assert!(app.dependencies["os"].is_external);
    let main = &app.symbols["main"];
    assert!(main.dependencies["os"].is_external);
    // Same-file references stay at symbol level only.
    assert!(main.dependencies["app.py"].symbols.contains_key("checkout"));
    assert!(!app.dependencies.contains_key("app.py"));
}

#[test]
fn cyclic_modules_depend_on_each_other() {
    let (_, manifest) = analyze("py_shop", Language::Python);
    let ping = &manifest.file("shop/cycle_a.py").unwrap().symbols["ping"];
    assert!(ping.dependencies["shop/cycle_b.py"].symbols.contains_key("pong"));
    let pong = &manifest.file("shop/cycle_b.py").unwrap().symbols["pong"];
    assert!(pong.dependencies["shop/cycle_a.py"].symbols.contains_key("ping"));
}

#[test]
fn c_definitions_link_to_header_declarations() {
    let (_, manifest) = analyze("c_burgers", Language::C);
    let create = &manifest.file("burgers.c").unwrap().symbols["create_burger"];
    let header = &create.dependencies["burgers.h"];
    for name in ["create_burger", "Burger", "Condiment", "Sauce", "burger_count"] {
        assert!(header.symbols.contains_key(name), "missing {name}");
    }
    assert!(!header.symbols.contains_key("MAX_BURGERS"));

    let burgers = manifest.file("burgers.c").unwrap();
    assert!(burgers.dependencies["stdlib.h"].is_external);
    assert!(burgers.symbols["burgers"].dependencies["burgers.h"].symbols.contains_key("MAX_BURGERS"));
}

#[test]
fn c_typedefs_and_enum_members_resolve_to_their_types() {
    let (_, manifest) = analyze("c_burgers", Language::C);
    let header = manifest.file("burgers.h").unwrap();
    assert_eq!(header.symbols["Burger_t"].kind, SymbolKind::Typedef);
    assert_eq!(header.symbols["Burger"].kind, SymbolKind::Struct);
    assert_eq!(header.symbols["Fries"].kind, SymbolKind::Typedef);
    assert_eq!(header.symbols["MAX"].kind, SymbolKind::Macro);
    assert!(
        header.symbols["Burger_t"].dependencies["burgers.h"]
            .symbols
            .contains_key("Burger")
    );
    assert!(
        header.symbols["Burger"].dependencies["burgers.h"]
            .symbols
            .contains_key("Burger_t")
    );

    let main = &manifest.file("main.c").unwrap().symbols["main"];
    let used = &main.dependencies["burgers.h"].symbols;
    // CHEESE, TOMATO and MAYO are members of these enums.
    assert!(used.contains_key("Condiment"));
    assert!(used.contains_key("ClassicSauce"));
    assert!(used.contains_key("create_burger"));
}

#[test]
fn metrics_are_filled_in() {
    let (_, manifest) = analyze("py_shop", Language::Python);
    let pricing = manifest.file("shop/pricing.py").unwrap();
    assert_eq!(pricing.metrics.lines_count, 11);
    assert!(pricing.metrics.code_line_count <= pricing.metrics.lines_count);
    let price = &pricing.symbols["price"];
    assert_eq!(price.metrics.lines_count, 2);
    assert_eq!(price.metrics.cyclomatic_complexity, 1);
    let ping = &manifest.file("shop/cycle_a.py").unwrap().symbols["ping"];
    assert_eq!(ping.metrics.cyclomatic_complexity, 2);
}
