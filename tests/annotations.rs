use depslice::analysis::{Analysis, AnalysisOptions};
use depslice::annotations::{INDEX_FILE, scan, split};
use depslice::error::ExtractError;
use depslice::model::{Language, Manifest};
use depslice::source::{Project, ScanOptions};
use std::fs;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn api() -> (Analysis, Manifest) {
    let project = Project::load(
        &fixture_path("py_api"),
        Language::Python,
        &ScanOptions::default(),
    )
    .unwrap();
    let analysis = Analysis::new(project, AnalysisOptions::default());
    let manifest = analysis.manifest().unwrap();
    (analysis, manifest)
}

#[test]
fn scan_collects_endpoints_in_visit_order() {
    let (analysis, manifest) = api();
    let endpoints = scan(&analysis, &manifest, "api/app.py").unwrap();
    assert_eq!(endpoints.len(), 5);

    let modules: Vec<_> = endpoints.iter().filter(|e| e.is_module()).collect();
    assert_eq!(modules.len(), 2);
    assert_eq!(modules[0].file, "api/app.py");
    assert_eq!(modules[0].line, 7);
    assert_eq!(modules[0].annotation.path, "/api/elves");
    assert!(modules[0].seeds["api/elves.py"].contains("elves_bp"));
    assert_eq!(modules[1].line, 9);
    assert!(modules[1].seeds["api/orcs.py"].contains("orcs_bp"));

    let list = &endpoints[2];
    assert_eq!(list.file, "api/elves.py");
    assert_eq!(list.line, 7);
    assert_eq!(list.annotation.method.as_deref(), Some("GET"));
    assert_eq!(list.annotation.group.as_deref(), Some("elves"));
    assert!(list.seeds["api/elves.py"].contains("list_elves"));
    // Module code of the entrypoint comes along.
    assert!(list.seeds["api/app.py"].contains("app"));
    assert!(list.files.contains("api/app.py"));

    let orc = &endpoints[4];
    assert_eq!(orc.file, "api/orcs.py");
    assert_eq!(orc.annotation.method.as_deref(), Some("POST"));
    assert_eq!(orc.annotation.path, "/api/orcs");
    assert_eq!(orc.annotation.group, None);
    assert!(orc.seeds["api/orcs.py"].contains("add_orc"));
    assert!(orc.files.contains("api/orcs.py"));
}

#[test]
fn scan_rejects_unknown_entrypoint() {
    let (analysis, manifest) = api();
    assert!(matches!(
        scan(&analysis, &manifest, "api/missing.py"),
        Err(ExtractError::Seeds(_))
    ));
}

#[test]
fn split_writes_one_project_per_group() {
    let (analysis, manifest) = api();
    let out = tempfile::tempdir().unwrap();
    let index = split(&analysis, &manifest, "api/app.py", out.path()).unwrap();
    assert_eq!(index.len(), 2);

    let elves = &index[&0];
    assert_eq!(elves.group.as_deref(), Some("elves"));
    assert_eq!(elves.endpoints.len(), 2);
    assert_eq!(
        elves.files,
        vec!["api/app.py", "api/data.py", "api/elves.py"]
    );
    let app = fs::read_to_string(out.path().join("0/api/app.py")).unwrap();
    assert!(app.contains("app.register_blueprint(elves_bp)"));
    assert!(app.contains("app.run()"));
    assert!(!app.contains("orcs"));
    let data = fs::read_to_string(out.path().join("0/api/data.py")).unwrap();
    assert!(data.contains("ELVES"));
    assert!(!data.contains("ORCS"));
    assert!(!out.path().join("0/api/orcs.py").exists());

    let orcs = &index[&1];
    assert_eq!(orcs.method.as_deref(), Some("POST"));
    assert_eq!(orcs.path, "/api/orcs");
    assert_eq!(orcs.files, vec!["api/app.py", "api/data.py", "api/orcs.py"]);
    let app = fs::read_to_string(out.path().join("1/api/app.py")).unwrap();
    assert!(app.contains("app.register_blueprint(orcs_bp)"));
    assert!(!app.contains("elves"));

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.path().join(INDEX_FILE)).unwrap()).unwrap();
    assert_eq!(written["1"]["path"], "/api/orcs");
    assert_eq!(written["0"]["endpoints"].as_array().map(Vec::len), Some(2));
}

#[test]
fn split_replaces_previous_output() {
    let (analysis, manifest) = api();
    let out = tempfile::tempdir().unwrap();
    let stale = out.path().join("0/api/stale.py");
    fs::create_dir_all(stale.parent().unwrap()).unwrap();
    fs::write(&stale, "x = 1\n").unwrap();

    split(&analysis, &manifest, "api/app.py", out.path()).unwrap();
    assert!(!stale.exists());
    assert!(out.path().join("0/api/elves.py").exists());
}
