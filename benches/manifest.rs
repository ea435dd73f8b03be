use criterion::{Criterion, black_box, criterion_group, criterion_main};
use depslice::analysis::{Analysis, AnalysisOptions};
use depslice::extractor::Extractor;
use depslice::model::{Language, SymbolSet};
use depslice::source::{Project, ScanOptions};
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn analysis(name: &str, language: Language) -> Analysis {
    let project = Project::load(&fixture_path(name), language, &ScanOptions::default()).unwrap();
    Analysis::new(project, AnalysisOptions::default())
}

/// Parsing, registry, resolution and usage from scratch on every iteration.
fn bench_manifest(c: &mut Criterion) {
    let mut group = c.benchmark_group("manifest");
    for (name, language) in [("py_shop", Language::Python), ("c_burgers", Language::C)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let analysis = analysis(black_box(name), language);
                black_box(analysis.manifest().unwrap())
            })
        });
    }
    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let analysis = analysis("c_burgers", Language::C);
    let manifest = analysis.manifest().unwrap();
    let mut seeds = SymbolSet::new();
    seeds
        .entry("main.c".to_string())
        .or_default()
        .insert("main".to_string());

    c.bench_function("extract_main_c", |b| {
        b.iter(|| {
            let extractor = Extractor::new(&analysis, &manifest);
            black_box(extractor.extract(black_box(&seeds)).unwrap())
        })
    });
}

criterion_group!(benches, bench_manifest, bench_extract);
criterion_main!(benches);
