use depslice::analysis::{Analysis, AnalysisOptions};
use depslice::error::{ExtractError, SeedError};
use depslice::extractor::Extractor;
use depslice::model::{Language, SymbolSet};
use depslice::source::{Project, ScanOptions};
use std::collections::BTreeMap;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn load(name: &str, language: Language) -> Analysis {
    let project = Project::load(&fixture_path(name), language, &ScanOptions::default()).unwrap();
    Analysis::new(project, AnalysisOptions::default())
}

fn in_memory(language: Language, sources: &[(&str, &str)]) -> Analysis {
    let project = Project::from_sources(language, sources.iter().copied()).unwrap();
    Analysis::new(project, AnalysisOptions::default())
}

fn seeds(pairs: &[(&str, &str)]) -> SymbolSet {
    let mut out = SymbolSet::new();
    for (file, name) in pairs {
        out.entry(file.to_string())
            .or_default()
            .insert(name.to_string());
    }
    out
}

fn extract(analysis: &Analysis, seeds: &SymbolSet) -> BTreeMap<String, String> {
    let manifest = analysis.manifest().unwrap();
    Extractor::new(analysis, &manifest).extract(seeds).unwrap()
}

/// Runs the same extraction again on its own output.
fn reextract(
    language: Language,
    files: &BTreeMap<String, String>,
    seeds: &SymbolSet,
) -> BTreeMap<String, String> {
    let project =
        Project::from_sources(language, files.iter().map(|(id, text)| (id, text.clone()))).unwrap();
    let analysis = Analysis::new(project, AnalysisOptions::default());
    extract(&analysis, seeds)
}

#[test]
fn burger_extraction_is_minimal() {
    let analysis = load("c_burgers", Language::C);
    let seeds = seeds(&[("burgers.c", "create_burger")]);
    let out = extract(&analysis, &seeds);

    let files: Vec<&str> = out.keys().map(String::as_str).collect();
    assert_eq!(files, vec!["burgers.c", "burgers.h"]);

    let header = &out["burgers.h"];
    for kept in [
        "#ifndef BURGERS_H",
        "#define BURGERS_H",
        "#endif",
        "enum Condiment {",
        "enum ClassicSauce {",
        "union Sauce {",
        "struct Burger {",
        "typedef struct Burger Burger_t;",
        "static int burger_count = 0;",
        "struct Burger* create_burger(",
    ] {
        assert!(header.contains(kept), "header lost `{kept}`:\n{header}");
    }
    for dropped in ["MAX_BURGERS", "#define MAX(", "Fries", "destroy_burger", "get_cheapest_burger"] {
        assert!(!header.contains(dropped), "header kept `{dropped}`:\n{header}");
    }

    let source = &out["burgers.c"];
    assert!(source.contains("#include \"burgers.h\""));
    assert!(source.contains("#include <stdlib.h>"));
    assert!(source.contains("create_burger(char name[50]"));
    assert!(!source.contains("destroy_burger"));
    assert!(!source.contains("get_cheapest_burger"));
    assert!(!source.contains("burgers[MAX_BURGERS]"));
}

#[test]
fn burger_extraction_is_idempotent() {
    let analysis = load("c_burgers", Language::C);
    let seeds = seeds(&[("burgers.c", "create_burger")]);
    let first = extract(&analysis, &seeds);
    let second = reextract(Language::C, &first, &seeds);
    assert_eq!(first, second);
}

#[test]
fn include_chain_headers_are_kept() {
    let analysis = load("c_burgers", Language::C);
    let out = extract(&analysis, &seeds(&[("main.c", "main")]));

    let files: Vec<&str> = out.keys().map(String::as_str).collect();
    assert_eq!(files, vec!["burgers.c", "burgers.h", "main.c", "menu.h"]);

    let menu = &out["menu.h"];
    assert!(menu.contains("#define MENU_H"));
    assert!(menu.contains("#include \"burgers.h\""));
    assert!(!menu.contains("special_of_the_day"));
    assert!(!menu.contains("MENU_SIZE"));

    let main = &out["main.c"];
    assert!(main.contains("#include \"menu.h\""));
    assert!(main.contains("#include <stdio.h>"));
}

#[test]
fn conditional_defines_are_kept() {
    let analysis = load("c_config", Language::C);
    let seeds = seeds(&[("config.c", "speed")]);
    let out = extract(&analysis, &seeds);
    let config = &out["config.c"];

    assert!(config.contains("#define USE_FAST 1"), "{config}");
    assert!(config.contains("#define LEVEL 2"), "{config}");
    assert!(config.contains("#ifdef USE_FAST"));
    assert!(config.contains("#ifndef SLOW_PATH"));
    assert!(config.contains("int speed(void) { return 2; }"));
    assert!(config.contains("int speed(void) { return 1; }"));
    assert!(!config.contains("UNUSED_FLAG"));
    assert!(!config.contains("int depth"));
    assert!(!config.contains("int idle"));

    let second = reextract(Language::C, &out, &seeds);
    assert_eq!(out, second);
}

#[test]
fn define_selecting_a_branch_survives() {
    let analysis = in_memory(
        Language::C,
        &[(
            "cfg.c",
            "#define USE_FAST 1\n\n#ifdef USE_FAST\nint speed(void) { return 2; }\n#else\nint speed(void) { return 1; }\n#endif\n",
        )],
    );
    let out = extract(&analysis, &seeds(&[("cfg.c", "speed")]));
    assert!(out["cfg.c"].starts_with("#define USE_FAST 1"), "{}", out["cfg.c"]);
}

#[test]
fn module_code_pulls_in_what_it_calls() {
    let analysis = load("py_startup", Language::Python);
    let seeds = seeds(&[("app.py", "handler")]);
    let out = extract(&analysis, &seeds);

    let files: Vec<&str> = out.keys().map(String::as_str).collect();
    assert_eq!(files, vec!["app.py", "registry.py", "tasks.py"]);

    let app = &out["app.py"];
    assert!(app.contains("from registry import register"));
    assert!(app.contains("from tasks import cleanup"));
    assert!(app.contains("register(handler)"));
    assert!(app.contains("cleanup()"));
    assert!(!app.contains("def unused_handler"));

    let registry = &out["registry.py"];
    assert!(registry.contains("HANDLERS = []"));
    assert!(registry.contains("def register(fn):"));
    assert!(!registry.contains("def unregister"));
    assert!(!out["tasks.py"].contains("def unused"));

    let second = reextract(Language::Python, &out, &seeds);
    assert_eq!(out, second);
}

#[test]
fn module_level_call_keeps_its_import() {
    let analysis = in_memory(
        Language::Python,
        &[
            ("a.py", "from b import g\n\n\ndef f():\n    return 1\n\n\ng()\n"),
            ("b.py", "def g():\n    return 2\n"),
        ],
    );
    let out = extract(&analysis, &seeds(&[("a.py", "f")]));
    assert!(out["a.py"].contains("from b import g"), "{}", out["a.py"]);
    assert!(out["b.py"].contains("def g():"));
}

#[test]
fn python_extraction_follows_reexports_and_prunes_imports() {
    let analysis = load("py_shop", Language::Python);
    let out = extract(&analysis, &seeds(&[("app.py", "checkout")]));

    let files: Vec<&str> = out.keys().map(String::as_str).collect();
    assert_eq!(
        files,
        vec![
            "app.py",
            "shop/__init__.py",
            "shop/helpers.py",
            "shop/models.py",
            "shop/pricing.py"
        ]
    );

    let app = &out["app.py"];
    assert!(app.contains("import os"));
    assert!(app.contains("from shop import Item"));
    assert!(app.contains("from shop.pricing import price"));
    assert!(app.contains("from shop.helpers import *"));
    assert!(app.contains("def checkout(name, cost):"));
    assert!(!app.contains("import shop.tools"));
    assert!(!app.contains("def sharpen_all"));
    // `main()` runs at import time, so `main` stays.
    assert!(app.contains("def main():"));
    assert!(app.contains("main()"));

    assert_eq!(out["shop/__init__.py"], "from .models import Item\n");

    let models = &out["shop/models.py"];
    assert!(models.contains("class Item:"));
    assert!(!models.contains("class Cart"));
    assert!(!models.contains("_audit"));

    let pricing = &out["shop/pricing.py"];
    assert!(pricing.contains("TAX = 0.2"));
    assert!(pricing.contains("def price(item: Item):"));
    assert!(!pricing.contains("def discount"));

    let helpers = &out["shop/helpers.py"];
    assert!(helpers.contains("__all__ = [\"fmt\"]"));
    assert!(helpers.contains("def fmt(amount):"));
    assert!(!helpers.contains("def hidden"));
}

#[test]
fn python_extraction_is_idempotent() {
    let analysis = load("py_shop", Language::Python);
    let seeds = seeds(&[("app.py", "checkout")]);
    let first = extract(&analysis, &seeds);
    let second = reextract(Language::Python, &first, &seeds);
    assert_eq!(first, second);
}

#[test]
fn cyclic_dependencies_terminate() {
    let analysis = load("py_shop", Language::Python);
    let manifest = analysis.manifest().unwrap();
    let extractor = Extractor::new(&analysis, &manifest);
    let seeds = seeds(&[("shop/cycle_a.py", "ping")]);

    let closure = extractor.closure(&seeds).unwrap();
    assert!(closure.symbols["shop/cycle_a.py"].contains("ping"));
    assert!(closure.symbols["shop/cycle_b.py"].contains("pong"));

    let out = extractor.extract(&seeds).unwrap();
    assert_eq!(out.len(), 2);
    assert!(out["shop/cycle_a.py"].contains("from shop import cycle_b"));
    assert!(out["shop/cycle_b.py"].contains("from shop.cycle_a import ping"));
}

#[test]
fn missing_seeds_are_all_reported() {
    let analysis = load("py_shop", Language::Python);
    let manifest = analysis.manifest().unwrap();
    let extractor = Extractor::new(&analysis, &manifest);
    let seeds = seeds(&[
        ("nope.py", "x"),
        ("app.py", "checkout"),
        ("app.py", "missing"),
    ]);

    match extractor.extract(&seeds) {
        Err(ExtractError::Seeds(errors)) => {
            assert_eq!(errors.len(), 2);
            assert!(errors.contains(&SeedError::FileNotFound("nope.py".to_string())));
            assert!(errors.contains(&SeedError::SymbolNotFound {
                file: "app.py".to_string(),
                symbol: "missing".to_string(),
            }));
        }
        other => panic!("expected seed errors, got {other:?}"),
    }
}
